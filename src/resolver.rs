use std::path::{Path, PathBuf};

/// Candidate paths to try, in order, when executing `name`.
///
/// Behavior:
/// - the name itself comes first, so already-qualified paths (`/bin/ls`, `./run.sh`)
///   and programs in the current directory work as typed;
/// - then `dir/name` for each directory of `search_path`, in order.
///
/// Empty entries of `search_path` are skipped. An empty `name` yields no
/// candidates at all.
///
/// Nothing here touches the filesystem: the caller attempts each candidate and
/// stops at the first one that executes.
pub fn candidate_paths(search_path: &str, name: &str) -> Vec<PathBuf> {
    if name.is_empty() {
        return Vec::new();
    }
    std::iter::once(PathBuf::from(name))
        .chain(
            search_path
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(|dir| Path::new(dir).join(name)),
        )
        .collect()
}

/// First candidate that names an existing file, if any.
///
/// The executor does not need this (it simply attempts every candidate); it is
/// used for diagnostics.
pub fn find_command_path(search_path: &str, name: &str) -> Option<PathBuf> {
    candidate_paths(search_path, name)
        .into_iter()
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_first_then_each_directory_in_order() {
        let candidates = candidate_paths("/usr/local/bin:/usr/bin:/bin", "ls");
        assert_eq!(
            candidates,
            [
                PathBuf::from("ls"),
                PathBuf::from("/usr/local/bin/ls"),
                PathBuf::from("/usr/bin/ls"),
                PathBuf::from("/bin/ls"),
            ]
        );
    }

    #[test]
    fn qualified_name_is_tried_as_typed_first() {
        let candidates = candidate_paths("/bin", "/usr/bin/env");
        assert_eq!(candidates[0], PathBuf::from("/usr/bin/env"));

        let candidates = candidate_paths("/bin", "./run.sh");
        assert_eq!(candidates[0], PathBuf::from("./run.sh"));
        assert_eq!(candidates[1], PathBuf::from("/bin/./run.sh"));
    }

    #[test]
    fn empty_search_path_entries_are_skipped() {
        let candidates = candidate_paths(":/bin::", "sh");
        assert_eq!(candidates, [PathBuf::from("sh"), PathBuf::from("/bin/sh")]);
        assert_eq!(candidate_paths("", "sh"), [PathBuf::from("sh")]);
    }

    #[test]
    fn empty_name_has_no_candidates() {
        assert!(candidate_paths("/bin", "").is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn finds_sh_through_search_path() {
        let found = find_command_path("/nonexistent_dir:/bin:/usr/bin", "sh")
            .expect("Expected to find 'sh' via PATH search");
        assert!(found.ends_with("sh"));
        assert!(found.is_absolute());
    }

    #[test]
    fn missing_program_is_not_found() {
        assert!(find_command_path("/bin", "nonexisting_program_for_jobsh").is_none());
    }
}
