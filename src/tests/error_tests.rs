#[cfg(test)]
mod tests {
    use crate::error::{CatalogError, CatalogResult, OptionExt};
    use std::error::Error;
    use std::io;

    #[test]
    fn test_catalog_error_display() {
        let error = CatalogError::InvalidInput("Invalid input".to_string());
        assert_eq!(format!("{}", error), "Invalid input: Invalid input");

        let error = CatalogError::NotFound("page 3".to_string());
        assert_eq!(format!("{}", error), "Not found: page 3");

        let error = CatalogError::Decode("bad png".to_string());
        assert_eq!(format!("{}", error), "Decode error: bad png");

        assert_eq!(format!("{}", CatalogError::Cancelled), "Operation cancelled");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CatalogError::Io(String::new()).code(), "io");
        assert_eq!(CatalogError::Decode(String::new()).code(), "decode");
        assert_eq!(CatalogError::Persistence(String::new()).code(), "persistence");
        assert_eq!(CatalogError::Conflict(String::new()).code(), "conflict");
        assert_eq!(CatalogError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Access denied");
        let error: CatalogError = io_error.into();
        match error {
            CatalogError::Io(msg) => assert!(msg.contains("Access denied")),
            other => panic!("expected Io, got {:?}", other),
        }
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let error: CatalogError = sqlx::Error::RowNotFound.into();
        assert!(matches!(error, CatalogError::NotFound(_)));

        let error: CatalogError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(error, CatalogError::Persistence(_)));
    }

    #[test]
    fn test_zip_error_conversion() {
        let error: CatalogError = zip::result::ZipError::FileNotFound.into();
        assert!(matches!(error, CatalogError::NotFound(_)));

        let error: CatalogError = zip::result::ZipError::InvalidArchive("bad header".into()).into();
        assert!(matches!(error, CatalogError::Io(_)));
    }

    #[test]
    fn test_anyhow_error_has_source() {
        let error: CatalogError = anyhow::anyhow!("boom").into();
        assert!(matches!(error, CatalogError::Internal(_)));
        assert!(error.source().is_some());
        assert!(CatalogError::Cancelled.source().is_none());
    }

    #[tokio::test]
    async fn test_join_error_conversion() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let error: CatalogError = handle.await.unwrap_err().into();
        assert!(matches!(error, CatalogError::Cancelled));
    }

    #[test]
    fn test_option_ext() {
        let some_value: Option<i32> = Some(42);
        let result: CatalogResult<i32> = some_value.ok_or_not_found("Value");
        assert_eq!(result.unwrap(), 42);

        let none_value: Option<i32> = None;
        match none_value.ok_or_not_found("Title") {
            Err(CatalogError::NotFound(msg)) => assert_eq!(msg, "Title not found"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
