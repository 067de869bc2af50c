//! `build` argument compilation

use crate::{BuildIntent, EngineError, ImageReference, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

impl BuildIntent {
    /// Effective build context: the explicit context, else the Dockerfile's
    /// directory.
    pub fn context_dir(&self) -> PathBuf {
        match &self.context {
            Some(context) if !context.as_os_str().is_empty() => context.clone(),
            _ => match self.dockerfile.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }

    /// Image references in tag order
    pub fn images(&self) -> Vec<ImageReference> {
        self.tags
            .iter()
            .map(|tag| ImageReference::new(&self.uri, tag))
            .collect()
    }

    /// Compile the full `build` argument list.
    ///
    /// `ci` switches progress output to plain text. Build args and labels are
    /// emitted in sorted key order so identical intents always compile to the
    /// same list.
    pub fn to_args(&self, ci: bool) -> Result<Vec<String>> {
        if self.tags.is_empty() {
            return Err(EngineError::EmptyTags {
                uri: self.uri.clone(),
            });
        }
        let context = self.context_dir();

        let mut args = vec!["build".to_string()];

        for image in self.images() {
            args.push("-t".to_string());
            args.push(image.to_string());
        }

        for image in &self.cache_from {
            args.push("--cache-from".to_string());
            args.push(image.clone());
        }

        if let Some(target) = self.target.as_deref().filter(|t| !t.is_empty()) {
            args.push("--target".to_string());
            args.push(target.to_string());
        }

        if let Some(platform) = self.platform.as_deref().filter(|p| !p.is_empty()) {
            args.push("--platform".to_string());
            args.push(platform.to_string());
        }

        if ci {
            args.push("--progress".to_string());
            args.push("plain".to_string());
        }

        for pair in sorted_pairs(&self.args) {
            args.push("--build-arg".to_string());
            args.push(pair);
        }

        for pair in sorted_pairs(&self.labels) {
            args.push("--label".to_string());
            args.push(pair);
        }

        args.push(path_arg(&context));
        args.push("-f".to_string());
        args.push(path_arg(&self.dockerfile));
        Ok(args)
    }
}

/// `key=value` strings ordered by key
pub(crate) fn sorted_pairs(map: &HashMap<String, String>) -> Vec<String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| format!("{}={}", k, map[k]))
        .collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
