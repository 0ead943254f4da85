//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("invalid port");
        assert_eq!(err.to_string(), "configuration error: invalid port");
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("no such node: foo/bar");
        assert_eq!(err.to_string(), "not found: no such node: foo/bar");
    }

    #[test]
    fn test_tree_error_conversion() {
        let tree_err = TreeError::UnsafePath("../etc".to_string());
        let err: Error = tree_err.into();
        assert!(matches!(err, Error::Tree(TreeError::UnsafePath(_))));
        assert_eq!(err.to_string(), "tree error: unsafe path: ../etc");
    }

    #[test]
    fn test_repo_no_data_sentinel() {
        let err: Error = RepoError::NoData.into();
        assert!(err.is_no_data());
        assert!(!Error::internal("x").is_no_data());
    }

    #[test]
    fn test_search_error_conversion() {
        let err: Error = SearchError::Language("fr".to_string()).into();
        assert!(matches!(err, Error::Search(_)));
        assert_eq!(err.to_string(), "search error: unsupported language: fr");
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, Error::Search(SearchError::Database(_))));
    }

    #[test]
    fn test_git_error_conversion() {
        let err: Error = git2::Error::from_str("reference not found").into();
        assert!(matches!(err, Error::Repo(RepoError::Git(_))));
        assert!(err.to_string().contains("reference not found"));
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::WatchFailed {
            path: "/tmp/test".to_string(),
            reason: "permission denied".to_string(),
        };
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
    }

    #[test]
    fn test_server_error_conversion() {
        let server_err = ServerError::BindFailed {
            address: "127.0.0.1:8080".to_string(),
            reason: "address in use".to_string(),
        };
        let err: Error = server_err.into();
        assert!(matches!(err, Error::Server(_)));
    }

    #[test]
    fn test_author_error_display() {
        let err: Error = AuthorError::Parse {
            line: 3,
            reason: "missing email".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "authors error: line 3: missing email");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<String>>("{ not: [a list").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(Error::config("test error"))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::Internal("something went wrong".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Internal"));
        assert!(debug_str.contains("something went wrong"));
    }

    #[test]
    fn test_config_failures_are_messages() {
        let config = crate::ServerConfig {
            port: 0,
            ..crate::ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(&err, Error::Config(msg) if msg == "port cannot be 0"));
        assert_eq!(err.to_string(), "configuration error: port cannot be 0");
    }

    #[test]
    fn test_source_incomplete_display() {
        let err = Error::SourceIncomplete("v1.0.0".to_string());
        assert_eq!(err.to_string(), "source 'v1.0.0' is not available yet");
    }
}
