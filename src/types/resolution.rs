use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::FileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionKind {
    Builtin,
    File,
    Directory,
    Module,
    Internal,
    External,
    NotFound,
    Error,
}

impl ResolutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::File => "file",
            Self::Directory => "directory",
            Self::Module => "module",
            Self::Internal => "internal",
            Self::External => "external",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }

    /// Whether the import failed to resolve at all.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::NotFound | Self::Error)
    }
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a single import string.
///
/// Failures are data, never `Err`: `kind` is [`ResolutionKind::NotFound`] or
/// [`ResolutionKind::Error`] and `error` carries the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleResolution {
    pub request_path: String,
    pub resolved_path: Option<PathBuf>,
    pub target_file: Option<FileId>,
    pub kind: ResolutionKind,
    pub is_external: bool,
    pub is_builtin: bool,
    pub error: Option<String>,
    /// Every registered file of a resolved package directory, `target_file` included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_files: Vec<FileId>,
}

impl ModuleResolution {
    fn with_kind(request_path: &str, kind: ResolutionKind) -> Self {
        Self {
            request_path: request_path.to_string(),
            resolved_path: None,
            target_file: None,
            kind,
            is_external: false,
            is_builtin: false,
            error: None,
            package_files: Vec::new(),
        }
    }

    pub fn builtin(request_path: &str) -> Self {
        Self {
            resolved_path: Some(PathBuf::from(request_path)),
            is_builtin: true,
            is_external: true,
            ..Self::with_kind(request_path, ResolutionKind::Builtin)
        }
    }

    pub fn external(request_path: &str, resolved_path: Option<PathBuf>) -> Self {
        Self {
            resolved_path,
            is_external: true,
            ..Self::with_kind(request_path, ResolutionKind::External)
        }
    }

    pub fn not_found(request_path: &str, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::with_kind(request_path, ResolutionKind::NotFound)
        }
    }

    pub fn error(request_path: &str, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::with_kind(request_path, ResolutionKind::Error)
        }
    }

    /// A hit inside the project. `target_file` is `None` when the path exists
    /// but was never registered with the engine.
    pub fn internal(
        request_path: &str,
        kind: ResolutionKind,
        resolved_path: PathBuf,
        target_file: Option<FileId>,
    ) -> Self {
        Self {
            resolved_path: Some(resolved_path),
            target_file,
            ..Self::with_kind(request_path, kind)
        }
    }

    pub fn with_package_files(mut self, files: Vec<FileId>) -> Self {
        self.package_files = files;
        self
    }

    /// Internal files this import makes the importer depend on.
    pub fn dependency_targets(&self) -> Vec<FileId> {
        if self.is_external {
            return Vec::new();
        }
        let mut targets: Vec<FileId> = self.target_file.into_iter().collect();
        for file in &self.package_files {
            if !targets.contains(file) {
                targets.push(*file);
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_external() {
        let res = ModuleResolution::builtin("fmt");
        assert_eq!(res.kind, ResolutionKind::Builtin);
        assert!(res.is_builtin);
        assert!(res.is_external);
        assert!(res.dependency_targets().is_empty());
    }

    #[test]
    fn test_dependency_targets_merge_package_files() {
        let a = FileId::new(1).unwrap();
        let b = FileId::new(2).unwrap();
        let res = ModuleResolution::internal("./pkg", ResolutionKind::Directory, "pkg".into(), Some(a))
            .with_package_files(vec![a, b]);
        assert_eq!(res.dependency_targets(), vec![a, b]);
    }

    #[test]
    fn test_unresolved_kinds() {
        assert!(ModuleResolution::not_found("./x", "missing").kind.is_unresolved());
        assert!(ModuleResolution::error("./x", "bad").kind.is_unresolved());
        assert!(!ModuleResolution::external("lodash", None).kind.is_unresolved());
    }
}
