// ==========================================
// Hierarchy Recon - Level-path resolver
// ==========================================
// LEVEL_n columns → canonical path used for parent lookup
// Rule: window columns only, trimmed, blanks dropped, consecutive repeats collapsed
// ==========================================

use crate::domain::types::LevelWindow;

pub struct LevelPathResolver {
    window: LevelWindow,
}

impl LevelPathResolver {
    pub fn new(window: LevelWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> LevelWindow {
        self.window
    }

    /// Collapsed path of a row's positional levels.
    pub fn resolve(&self, levels: &[String]) -> Vec<String> {
        self.resolve_with_positions(levels)
            .into_iter()
            .map(|(_, name)| name)
            .collect()
    }

    /// Sort values aligned with `resolve`; a collapsed run takes the value of its first column.
    pub fn resolve_sorts(&self, levels: &[String], level_sorts: &[Option<i64>]) -> Vec<Option<i64>> {
        self.resolve_with_positions(levels)
            .into_iter()
            .map(|(pos, _)| level_sorts.get(pos).copied().flatten())
            .collect()
    }

    /// Path minus its last element; `None` for a root-level path.
    pub fn parent_path(path: &[String]) -> Option<&[String]> {
        if path.len() > 1 {
            Some(&path[..path.len() - 1])
        } else {
            None
        }
    }

    /// Every proper ancestor path, shallowest first.
    pub fn ancestor_paths(path: &[String]) -> Vec<Vec<String>> {
        (1..path.len()).map(|n| path[..n].to_vec()).collect()
    }

    // (0-based column position, trimmed name)
    fn resolve_with_positions(&self, levels: &[String]) -> Vec<(usize, String)> {
        let mut out: Vec<(usize, String)> = Vec::new();
        for n in self.window.columns() {
            let pos = n - 1;
            let Some(raw) = levels.get(pos) else {
                break;
            };
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            if out.last().map(|(_, last)| last.as_str()) == Some(name) {
                continue;
            }
            out.push((pos, name.to_string()));
        }
        out
    }
}
