//! Accepted-password store.
//!
//! A flat file, one plaintext password per line; blank lines and lines
//! starting with `#` are ignored. Read fully on every lookup (no held
//! lock) so an operator tool can append newly observed passwords
//! between checks, matching the shared-resource policy in the spec.

use std::{fs, path::PathBuf};

pub struct PasswordStore {
    path: PathBuf,
}

impl PasswordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PasswordStore { path: path.into() }
    }

    /// Returns true if `password` appears as a non-comment, non-blank
    /// line in the store. A missing file is treated as an empty store.
    pub fn contains(&self, password: &str) -> bool {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(_) => return false,
        };
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .any(|line| line == password)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = PasswordStore::new(dir.path().join("passwords.txt"));
        assert!(!store.contains("hunter2"));
    }

    #[test]
    fn finds_password_ignoring_comments_and_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwords.txt");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "# observed in the wild").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "hunter2").unwrap();
        writeln!(f, "123456").unwrap();

        let store = PasswordStore::new(&path);
        assert!(store.contains("hunter2"));
        assert!(store.contains("123456"));
        assert!(!store.contains("# observed in the wild"));
        assert!(!store.contains("swordfish"));
    }

    #[test]
    fn sees_appended_passwords_without_reopening() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwords.txt");
        fs::write(&path, "first\n").unwrap();
        let store = PasswordStore::new(&path);
        assert!(!store.contains("second"));

        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "second").unwrap();
        assert!(store.contains("second"));
    }
}
