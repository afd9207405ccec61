//! Directory scanning: maps a project root into the channel tree. Pure
//! shape translation; hidden and well-known build/vendor directories are
//! skipped and depth is capped to keep huge monorepos tractable.

use std::path::Path;

use uuid::Uuid;

use crate::core::types::Channel;

const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".next",
    ".nuxt",
    "build",
];

const MAX_DEPTH: u32 = 4;

fn scan_recursive(dir: &Path, depth: u32) -> Vec<Channel> {
    if depth >= MAX_DEPTH {
        return Vec::new();
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut result: Vec<Channel> = Vec::new();
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || SKIP_DIRS.contains(&name.as_str()) {
            continue;
        }

        let path = entry.path();
        let children = scan_recursive(&path, depth + 1);
        result.push(Channel {
            id: Uuid::new_v4().to_string(),
            name,
            path: path.to_string_lossy().to_string(),
            children,
        });
    }

    result.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    result
}

/// Scan `root` into a single channel whose children mirror the directory
/// tree under it.
pub fn scan_root(root: &Path) -> Channel {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| root.to_string_lossy().to_string());

    Channel {
        id: Uuid::new_v4().to_string(),
        name,
        path: root.to_string_lossy().to_string(),
        children: scan_recursive(root, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_tree() -> PathBuf {
        let root = std::env::temp_dir().join(format!("threadmux-scan-{}", Uuid::new_v4()));
        std::fs::create_dir_all(root.join("beta/sub")).unwrap();
        std::fs::create_dir_all(root.join("Alpha")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/junk")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        std::fs::write(root.join("file.txt"), "not a dir").unwrap();
        root
    }

    #[test]
    fn scan_skips_hidden_and_vendor_dirs_and_sorts_case_insensitively() {
        let root = temp_tree();
        let channel = scan_root(&root);
        std::fs::remove_dir_all(&root).ok();

        let names: Vec<&str> = channel.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "beta"]);
        assert_eq!(channel.children[1].children.len(), 1);
        assert_eq!(channel.children[1].children[0].name, "sub");
    }

    #[test]
    fn channel_lookup_finds_nested_nodes() {
        let root = temp_tree();
        let channel = scan_root(&root);
        std::fs::remove_dir_all(&root).ok();

        let sub_id = channel.children[1].children[0].id.clone();
        assert_eq!(channel.find(&sub_id).unwrap().name, "sub");
        assert!(channel.find("missing").is_none());
    }
}
