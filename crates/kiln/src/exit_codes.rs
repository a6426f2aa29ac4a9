//! Exit codes for the CLI

use kiln_engine::BuildError;
use kiln_manifest::KilnError;

/// Success
pub const SUCCESS: i32 = 0;

/// A recipe failed, or an unexpected error occurred
pub const BUILD_FAILED: i32 = 1;

/// The declarations could not be loaded or do not form a valid graph
pub const MANIFEST_ERROR: i32 = 2;

/// Interrupted before the build finished
pub const CANCELLED: i32 = 130;

/// Exit code for an error that aborted a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<KilnError>().is_some() || err.downcast_ref::<BuildError>().is_some() {
        MANIFEST_ERROR
    } else {
        BUILD_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use kiln_manifest::ConfigError;

    #[test]
    fn test_manifest_errors() {
        let err = anyhow::Error::from(KilnError::from(ConfigError::NotFound(".".into())));
        assert_eq!(for_error(&err), MANIFEST_ERROR);

        let err: anyhow::Result<()> =
            Err(BuildError::UnknownTarget("app".into())).context("resolving targets");
        assert_eq!(for_error(&err.unwrap_err()), MANIFEST_ERROR);
    }

    #[test]
    fn test_other_errors() {
        let err = anyhow::anyhow!("runtime failed to start");
        assert_eq!(for_error(&err), BUILD_FAILED);
    }
}
