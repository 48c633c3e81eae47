use std::path::PathBuf;

/// The daemon binary ships next to the CLI binary.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name("dwelltime-daemon");
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::to_daemon_path;

    #[test]
    fn daemon_lives_next_to_the_cli() {
        let daemon = to_daemon_path(PathBuf::from("/opt/dwelltime/bin/dwelltime"));
        assert_eq!(daemon.parent(), Some(PathBuf::from("/opt/dwelltime/bin").as_path()));
        assert!(daemon
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("dwelltime-daemon"));
    }
}
