//! The kiosk software's INI settings file.

use std::fs;
use std::path::{Path, PathBuf};

use ini::{EscapePolicy, Ini, ParseOption};
use mbs_core::ConfigStore;

use crate::StoreError;

/// File-backed section → key → value store.
///
/// Values are read and written verbatim: the kiosk software does not use INI
/// escapes, and Windows paths must survive a rewrite unchanged.
#[derive(Debug)]
pub struct IniFile {
    path: PathBuf,
    ini: Ini,
}

impl IniFile {
    /// Loads the file, treating a missing file as empty.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let options = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(content.trim_start_matches('\u{feff}'), options).map_err(
            |err| StoreError::IniParse {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        )?;

        Ok(Self {
            path: path.to_path_buf(),
            ini,
        })
    }

    /// Rewrites the whole file.
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.ini
            .write_to_file_policy(&self.path, EscapePolicy::Nothing)
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

impl ConfigStore for IniFile {
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini.get_from(Some(section), key)
    }

    fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }
}

#[cfg(test)]
mod tests {
    use mbs_core::{ConfigTree, reconcile};

    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        let file = IniFile::load(&temp.path().join("absent.ini")).unwrap();
        assert_eq!(file.get("DOG", "INICIO"), None);
    }

    #[test]
    fn reads_existing_values_verbatim() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "[DOG]\nINICIO=48\nRUTA=C:\\kiosk\\videos\n").unwrap();

        let file = IniFile::load(&path).unwrap();
        assert_eq!(file.get("DOG", "INICIO"), Some("48"));
        assert_eq!(file.get("DOG", "RUTA"), Some("C:\\kiosk\\videos"));
    }

    #[test]
    fn keys_are_case_sensitive() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "[DOG]\njack=2000\n").unwrap();

        let file = IniFile::load(&path).unwrap();
        assert_eq!(file.get("DOG", "jack"), Some("2000"));
        assert_eq!(file.get("DOG", "JACK"), None);
    }

    #[test]
    fn save_round_trips_through_reconcile() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "[DOG]\nINICIO=48\nRUTA=C:\\kiosk\n").unwrap();

        let mut remote = ConfigTree::new();
        remote.insert("DOG", "INICIO", "50");
        remote.insert("PANTALLA", "MENSAJE", "BIENVENIDOS A MBRACES");

        let mut file = IniFile::load(&path).unwrap();
        let report = reconcile(&remote, &mut file);
        assert_eq!(report.changed.len(), 2);
        file.save().unwrap();

        let reloaded = IniFile::load(&path).unwrap();
        assert_eq!(reloaded.get("DOG", "INICIO"), Some("50"));
        assert_eq!(reloaded.get("DOG", "RUTA"), Some("C:\\kiosk"));
        assert_eq!(
            reloaded.get("PANTALLA", "MENSAJE"),
            Some("BIENVENIDOS A MBRACES")
        );

        let mut reloaded = reloaded;
        assert!(!reconcile(&remote, &mut reloaded).has_changes());
    }

    #[test]
    fn multiline_remote_value_never_reaches_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "[PANTALLA]\nMENSAJE=HOLA\n").unwrap();

        let remote = serde_json::json!({"PANTALLA": {"MENSAJE": "LINEA UNO\nLINEA DOS", "OTRO": "x"}});
        assert!(ConfigTree::from_json(&remote).is_err());

        let mut remote = ConfigTree::new();
        remote.insert("PANTALLA", "MENSAJE", "LINEA UNO");
        remote.insert("PANTALLA", "OTRO", "x");
        let mut file = IniFile::load(&path).unwrap();
        assert_eq!(reconcile(&remote, &mut file).changed.len(), 2);
        file.save().unwrap();

        let mut reloaded = IniFile::load(&path).unwrap();
        assert_eq!(reloaded.get("PANTALLA", "MENSAJE"), Some("LINEA UNO"));
        assert!(!reconcile(&remote, &mut reloaded).has_changes());
    }

    #[test]
    fn leading_bom_is_ignored() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("app.ini");
        fs::write(&path, "\u{feff}[DOG]\nINICIO=48\n").unwrap();
        let file = IniFile::load(&path).unwrap();
        assert_eq!(file.get("DOG", "INICIO"), Some("48"));
    }
}
