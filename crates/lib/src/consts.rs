/// Environment variable that points at a pipeline config file.
pub const CONFIG_ENV_VAR: &str = "STAGEGRAPH_CONFIG";

/// Config file looked up at the workspace root when no other source is given.
pub const CONFIG_FILE_NAME: &str = "stagegraph.json";

/// Algorithm prefix of every vertex digest.
pub const DIGEST_ALGORITHM: &str = "sha256";

/// Version of the definition wire format.
pub const DEFINITION_VERSION: u32 = 1;

/// `PATH` given to run operations whose state does not set one.
pub const DEFAULT_PATH_ENV: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
