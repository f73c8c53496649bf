//! Aviation products: a named input directory with its routing targets.

use avi_common::{FileConfig, FileReference};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Final placement of a processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteDestination {
    Archive,
    Fail,
}

#[derive(Debug, Clone)]
pub struct AviationProduct {
    pub id: String,
    /// Route name stored with every record from this product.
    pub route: String,
    pub input_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub fail_dir: PathBuf,
    /// Tried in order; the first matching pattern applies.
    pub files: Vec<FileConfig>,
}

impl AviationProduct {
    pub fn file_config_for(&self, filename: &str) -> Option<&FileConfig> {
        self.files.iter().find(|config| config.matches(filename))
    }

    pub fn file_reference(&self, filename: impl Into<String>) -> FileReference {
        FileReference::new(self.id.clone(), filename)
    }

    pub fn dir(&self, destination: RouteDestination) -> &Path {
        match destination {
            RouteDestination::Archive => &self.archive_dir,
            RouteDestination::Fail => &self.fail_dir,
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectoryRole {
    Input,
    Archive,
    Fail,
}

impl DirectoryRole {
    fn name(&self) -> &'static str {
        match self {
            DirectoryRole::Input => "input",
            DirectoryRole::Archive => "archive",
            DirectoryRole::Fail => "fail",
        }
    }
}

/// Check a set of products for consistency:
///
/// - ids are non-empty and unique,
/// - every product has at least one file config,
/// - an input directory belongs to exactly one product and is never an output,
/// - a product may use one directory for both archive and fail,
/// - a directory shared between products has the same role in all of them.
pub fn validate_products(products: &[AviationProduct]) -> Result<(), ConfigError> {
    if products.is_empty() {
        return Err(ConfigError::Product("no products configured".into()));
    }

    let mut ids = HashSet::new();
    let mut usage: BTreeMap<PathBuf, Vec<(&str, DirectoryRole)>> = BTreeMap::new();
    for product in products {
        if product.id.trim().is_empty() {
            return Err(ConfigError::Product("product id must not be empty".into()));
        }
        if !ids.insert(product.id.as_str()) {
            return Err(ConfigError::Product(format!("duplicate product id '{}'", product.id)));
        }
        if product.files.is_empty() {
            return Err(ConfigError::Product(format!("product '{}' has no file configurations", product.id)));
        }
        for (dir, role) in [
            (&product.input_dir, DirectoryRole::Input),
            (&product.archive_dir, DirectoryRole::Archive),
            (&product.fail_dir, DirectoryRole::Fail),
        ] {
            usage.entry(normalize(dir)).or_default().push((product.id.as_str(), role));
        }
    }

    for (dir, users) in &usage {
        let describe = || {
            users
                .iter()
                .map(|(id, role)| format!("{} of '{}'", role.name(), id))
                .collect::<Vec<_>>()
                .join(", ")
        };
        if users.len() > 1 && users.iter().any(|(_, role)| *role == DirectoryRole::Input) {
            return Err(ConfigError::Product(format!(
                "input directory {} is used more than once: {}",
                dir.display(),
                describe()
            )));
        }
        let (first_id, first_role) = users[0];
        let shared = users.iter().any(|(id, _)| *id != first_id);
        if shared && users.iter().any(|(_, role)| *role != first_role) {
            return Err(ConfigError::Product(format!(
                "directory {} is shared with different roles: {}",
                dir.display(),
                describe()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avi_common::MessageFormat;
    use chrono::FixedOffset;
    use regex::Regex;

    fn product(id: &str, root: &str) -> AviationProduct {
        AviationProduct {
            id: id.to_string(),
            route: "DEFAULT".to_string(),
            input_dir: PathBuf::from(format!("{}/in", root)),
            archive_dir: PathBuf::from(format!("{}/archive", root)),
            fail_dir: PathBuf::from(format!("{}/fail", root)),
            files: vec![
                FileConfig::new(Regex::new(r"^TAF_").unwrap(), MessageFormat::Tac, FixedOffset::east_opt(0).unwrap()),
                FileConfig::new(Regex::new(r"\.xml$").unwrap(), MessageFormat::Iwxxm, FixedOffset::east_opt(0).unwrap()),
            ],
        }
    }

    #[test]
    fn test_first_matching_file_config() {
        let p = product("taf", "/data/taf");
        assert_eq!(p.file_config_for("TAF_1.xml").map(|c| c.format()), Some(MessageFormat::Tac));
        assert_eq!(p.file_config_for("a.xml").map(|c| c.format()), Some(MessageFormat::Iwxxm));
        assert!(p.file_config_for("other.txt").is_none());
    }

    #[test]
    fn test_validation() {
        assert!(validate_products(&[product("taf", "/data/taf"), product("metar", "/data/metar")]).is_ok());
        assert!(validate_products(&[]).is_err());
        assert!(validate_products(&[product("taf", "/data/taf"), product("taf", "/data/other")]).is_err());

        let mut shared_input = product("metar", "/data/metar");
        shared_input.input_dir = PathBuf::from("/data/taf/./in");
        assert!(validate_products(&[product("taf", "/data/taf"), shared_input]).is_err());

        let mut loop_back = product("metar", "/data/metar");
        loop_back.archive_dir = PathBuf::from("/data/taf/in");
        assert!(validate_products(&[product("taf", "/data/taf"), loop_back]).is_err());

        let mut own_archive_is_fail = product("taf", "/data/taf");
        own_archive_is_fail.fail_dir = own_archive_is_fail.archive_dir.clone();
        assert!(validate_products(&[own_archive_is_fail]).is_ok());

        let mut shared_archive = product("metar", "/data/metar");
        shared_archive.archive_dir = PathBuf::from("/data/taf/archive");
        assert!(validate_products(&[product("taf", "/data/taf"), shared_archive]).is_ok());

        let mut mixed_roles = product("metar", "/data/metar");
        mixed_roles.fail_dir = PathBuf::from("/data/taf/archive");
        assert!(validate_products(&[product("taf", "/data/taf"), mixed_roles]).is_err());

        let mut own_input_is_fail = product("taf", "/data/taf");
        own_input_is_fail.fail_dir = own_input_is_fail.input_dir.clone();
        assert!(validate_products(&[own_input_is_fail]).is_err());

        let mut no_files = product("taf", "/data/taf");
        no_files.files.clear();
        assert!(validate_products(&[no_files]).is_err());
    }
}
