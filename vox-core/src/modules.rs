use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// One directory consulted for `import <name>`.
///
/// A root with an `os` key only applies when compiling for that OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    pub path: PathBuf,
    pub os: Option<String>,
}

impl SearchRoot {
    /// Parse `PATH` or `OS=PATH`.
    pub fn parse(raw: &str) -> SearchRoot {
        match raw.split_once('=') {
            Some((os, path))
                if !os.is_empty() && !os.contains(['/', '\\']) && !path.is_empty() =>
            {
                SearchRoot {
                    path: PathBuf::from(path),
                    os: Some(os.to_lowercase()),
                }
            }
            _ => SearchRoot {
                path: PathBuf::from(raw),
                os: None,
            },
        }
    }

    fn applies_to(&self, os: &str) -> bool {
        self.os.as_deref().is_none_or(|key| key == os)
    }
}

/// Ordered search roots for angle-bracket imports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRegistry {
    roots: Vec<SearchRoot>,
}

/// A module found through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    pub path: PathBuf,
    pub contents: String,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    pub fn add_root(&mut self, root: SearchRoot) {
        self.roots.push(root);
    }

    pub fn with_root(mut self, path: impl Into<PathBuf>, os: Option<&str>) -> Self {
        self.add_root(SearchRoot {
            path: path.into(),
            os: os.map(str::to_lowercase),
        });
        self
    }

    pub fn roots(&self) -> &[SearchRoot] {
        &self.roots
    }

    /// First readable `root/name` among the roots that apply to `os`.
    pub fn resolve(&self, name: &str, os: &str) -> Option<ModuleFile> {
        self.roots
            .iter()
            .filter(|root| root.applies_to(os))
            .find_map(|root| {
                let path = root.path.join(name);
                let contents = fs::read_to_string(&path).ok()?;
                tracing::debug!(module = name, path = %path.display(), "resolved module");
                Some(ModuleFile { path, contents })
            })
    }

    /// Every importable module name (path relative to its root) for `os`.
    pub fn discover(&self, os: &str) -> Vec<String> {
        let mut names = Vec::new();
        for root in self.roots.iter().filter(|root| root.applies_to(os)) {
            names.extend(list_files(&root.path));
        }
        names.sort();
        names.dedup();
        names
    }
}

fn list_files(root: &Path) -> Vec<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            Some(relative.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

/// OS key used to select search roots: `win`, `linux`, `macos`, ...
pub fn host_os_key() -> String {
    if cfg!(windows) {
        "win".to_string()
    } else {
        std::env::consts::OS.to_string()
    }
}

/// Conditional-compilation symbols describing the host.
pub fn host_defines() -> Vec<String> {
    let mut defines = Vec::new();

    let os = match std::env::consts::OS {
        "windows" => Some("WIN32"),
        "macos" | "ios" => Some("MAC"),
        "linux" | "android" => Some("LINUX"),
        "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Some("BSD"),
        "solaris" | "illumos" => Some("SOLARIS"),
        _ => None,
    };
    let arch = match std::env::consts::ARCH {
        "x86_64" => Some("X86_64"),
        "arm" | "aarch64" => Some("ARM"),
        "x86" => Some("X86"),
        "powerpc" | "powerpc64" => Some("PPC"),
        _ => None,
    };
    defines.extend(os.into_iter().chain(arch).map(String::from));

    defines.push(if cfg!(target_endian = "little") {
        "LITTLE_ENDIAN".to_string()
    } else {
        "BIG_ENDIAN".to_string()
    });

    let mut version = env!("CARGO_PKG_VERSION").split('.');
    let major = version.next().unwrap_or("0");
    let minor = version.next().unwrap_or("0");
    defines.push(format!("VOX_{major}_{minor}"));

    defines
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_os_keyed_roots() {
        let root = SearchRoot::parse("Linux=/opt/vox/lib");
        assert_eq!(root.os.as_deref(), Some("linux"));
        assert_eq!(root.path, PathBuf::from("/opt/vox/lib"));

        let plain = SearchRoot::parse("/opt/vox/lib");
        assert_eq!(plain.os, None);
        assert_eq!(SearchRoot::parse("./a=b/c").os, None);
    }

    #[test]
    fn resolves_first_readable_root_for_os() {
        let dir = tempdir().expect("tempdir");
        let win = dir.path().join("win");
        let common = dir.path().join("common");
        fs::create_dir_all(&win).expect("mkdir");
        fs::create_dir_all(&common).expect("mkdir");
        fs::write(win.join("io.vx"), "const A: int = 1").expect("write");
        fs::write(common.join("io.vx"), "const A: int = 2").expect("write");

        let registry = ModuleRegistry::new()
            .with_root(&win, Some("win"))
            .with_root(&common, None);

        let on_windows = registry.resolve("io.vx", "win").expect("module");
        assert!(on_windows.contents.contains("= 1"));
        let on_linux = registry.resolve("io.vx", "linux").expect("module");
        assert!(on_linux.contents.contains("= 2"));
        assert!(registry.resolve("missing.vx", "linux").is_none());
    }

    #[test]
    fn discovers_modules_recursively() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("std")).expect("mkdir");
        fs::write(dir.path().join("std/io.vx"), "").expect("write");
        fs::write(dir.path().join("math.vx"), "").expect("write");

        let registry = ModuleRegistry::new().with_root(dir.path(), None);
        assert_eq!(registry.discover("linux"), vec!["math.vx", "std/io.vx"]);
    }

    #[test]
    fn host_defines_include_byte_order_and_version() {
        let defines = host_defines();
        assert!(defines.iter().any(|d| d == "LITTLE_ENDIAN" || d == "BIG_ENDIAN"));
        assert!(defines.iter().any(|d| d.starts_with("VOX_")));
    }
}
