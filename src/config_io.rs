use log::error;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};

const FALLBACK_CONFIG_PATH: &str = "/tmp/vrknock";
const CONFIG_FILE: &str = "config.yaml";

pub static CONFIG_ROOT_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Ok(xdg_dirs) = xdg::BaseDirectories::new() {
        let mut dir = xdg_dirs.get_config_home();
        dir.push("vrknock");
        return dir;
    }
    //Return fallback config path
    error!(
        "Err: Failed to find config path, using {}",
        FALLBACK_CONFIG_PATH
    );
    PathBuf::from(FALLBACK_CONFIG_PATH)
});

pub fn get_conf_d_path(root: &Path) -> PathBuf {
    root.join("conf.d")
}

/// Config files under `root` in load order: `config.yaml` in the root,
/// `config.yaml` in `conf.d`, then every `conf.d` entry sorted by path.
pub fn config_files(root: &Path) -> Vec<PathBuf> {
    let path_conf_d = get_conf_d_path(root);
    let mut files: Vec<PathBuf> = [root, path_conf_d.as_path()]
        .iter()
        .map(|dir| dir.join(CONFIG_FILE))
        .filter(|p| p.exists())
        .collect();

    if let Ok(paths_unsorted) = std::fs::read_dir(&path_conf_d) {
        let mut paths: Vec<_> = paths_unsorted
            .filter_map(|r| match r {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    error!("Failed to read conf.d directory: {}", e);
                    None
                }
            })
            .filter(|p| p.is_file())
            .collect();
        // Sort paths alphabetically
        paths.sort();
        files.extend(paths);
    }
    files
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn files_are_listed_in_load_order() {
        let root = std::env::temp_dir().join(format!("vrknock-cfg-{}", std::process::id()));
        let conf_d = get_conf_d_path(&root);
        fs::create_dir_all(&conf_d).unwrap();
        for path in [
            root.join("config.yaml"),
            conf_d.join("20-late.yaml"),
            conf_d.join("10-early.yaml"),
        ] {
            fs::write(path, "poll_interval_ms: 20\n").unwrap();
        }

        let files = config_files(&root);
        fs::remove_dir_all(&root).unwrap();

        assert_eq!(
            files,
            vec![
                root.join("config.yaml"),
                conf_d.join("10-early.yaml"),
                conf_d.join("20-late.yaml"),
            ]
        );
    }

    #[test]
    fn missing_root_yields_nothing() {
        let root = std::env::temp_dir().join("vrknock-does-not-exist-at-all");
        assert!(config_files(&root).is_empty());
    }
}
