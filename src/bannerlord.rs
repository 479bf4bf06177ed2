use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const GAME_NAME: &str = "Mount & Blade II: Bannerlord";
const STEAM_APP_ID: &str = "261550";

#[derive(Debug, Clone)]
pub struct GamePaths {
    pub game_root: PathBuf,
    pub modules_dir: PathBuf,
    pub bin_dir: PathBuf,
}

pub fn detect_paths(game_root_override: Option<&Path>) -> Result<GamePaths> {
    let game_root = match game_root_override {
        Some(path) => path.to_path_buf(),
        None => find_game_root()
            .with_context(|| format!("locate {GAME_NAME} game directory"))?,
    };

    if !looks_like_game_root(&game_root) {
        bail!(
            "invalid game root: expected Modules/ and bin/ in {}",
            game_root.display()
        );
    }

    let modules_dir = game_root.join("Modules");
    let bin_dir = game_root.join("bin").join("Win64_Shipping_Client");

    Ok(GamePaths {
        game_root,
        modules_dir,
        bin_dir,
    })
}

fn find_game_root() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = dirs_home() {
        candidates.push(home.join(".local/share/Steam"));
        candidates.push(home.join(".steam/steam"));
    }

    let mut libraries = Vec::new();
    for base in candidates {
        let vdf = base.join("steamapps/libraryfolders.vdf");
        if vdf.exists() {
            if let Ok(paths) = parse_steam_library_paths(&vdf) {
                libraries.extend(paths);
            }
        }
        libraries.push(base);
    }

    for lib in libraries {
        let manifest = lib
            .join("steamapps")
            .join(format!("appmanifest_{STEAM_APP_ID}.acf"));
        let candidate = lib.join("steamapps/common/Mount & Blade II Bannerlord");
        if manifest.exists() && candidate.exists() {
            return Some(candidate);
        }
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

fn parse_steam_library_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(path).context("read libraryfolders.vdf")?;
    let mut paths = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if !line.contains("\"path\"") {
            continue;
        }

        let parts: Vec<&str> = line.split('"').collect();
        if parts.len() >= 4 {
            let path = parts[3].replace("\\\\", "\\");
            paths.push(PathBuf::from(path));
        }
    }

    Ok(paths)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

pub fn looks_like_game_root(path: &Path) -> bool {
    path.join("Modules").is_dir() && path.join("bin").is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_root_needs_modules_and_bin() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!looks_like_game_root(tmp.path()));
        fs::create_dir_all(tmp.path().join("Modules")).unwrap();
        assert!(!looks_like_game_root(tmp.path()));
        fs::create_dir_all(tmp.path().join("bin/Win64_Shipping_Client")).unwrap();
        assert!(looks_like_game_root(tmp.path()));
    }

    #[test]
    fn detect_paths_accepts_a_valid_override() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("Modules/Native")).unwrap();
        fs::create_dir_all(tmp.path().join("bin/Win64_Shipping_Client")).unwrap();
        let paths = detect_paths(Some(tmp.path())).unwrap();
        assert_eq!(paths.modules_dir, tmp.path().join("Modules"));
        assert!(paths.bin_dir.ends_with("Win64_Shipping_Client"));
    }

    #[test]
    fn detect_paths_rejects_a_bad_override() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(detect_paths(Some(tmp.path())).is_err());
    }

    #[test]
    fn library_folders_parse_path_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let vdf = tmp.path().join("libraryfolders.vdf");
        fs::write(
            &vdf,
            "\"libraryfolders\"\n{\n\t\"0\"\n\t{\n\t\t\"path\"\t\t\"/mnt/games/SteamLibrary\"\n\t}\n}\n",
        )
        .unwrap();
        let paths = parse_steam_library_paths(&vdf).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/mnt/games/SteamLibrary")]);
    }
}
