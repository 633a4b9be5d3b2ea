/// Application name used for data directories.
pub const APP_NAME: &str = "stagegate";

/// Length of truncated object hashes (run ids, cache keys in listings).
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "STAGEGATE_DATA_DIR";

/// Environment variable naming the base-image registry file.
pub const REGISTRY_ENV: &str = "STAGEGATE_REGISTRY";

/// Environment variable carrying a run-wide target platform override.
pub const TARGET_PLATFORM_ENV: &str = "STAGEGATE_TARGET_PLATFORM";

/// Registry file looked up next to the descriptor when none is given.
pub const DEFAULT_REGISTRY_FILENAME: &str = "images.toml";

/// Value exported as SOURCE_DATE_EPOCH to stage commands (1980-01-01, the ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";
