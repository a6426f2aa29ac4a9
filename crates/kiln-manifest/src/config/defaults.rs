//! Default declaration values

/// Default declaration file name (TOML)
pub const DEFAULT_MANIFEST_TOML: &str = "kiln.toml";

/// Default declaration file name (YAML)
pub const DEFAULT_MANIFEST_YAML: &str = "kiln.yaml";

/// Default number of parallel recipes
pub const DEFAULT_JOBS: usize = 1;

/// Default interpreter for shell recipes
pub const DEFAULT_SHELL: &str = "sh";

/// Default compile database file name
pub const COMPILE_DB_FILE: &str = "compile_commands.json";

/// Declaration file names searched in each directory, in priority order
pub fn manifest_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_MANIFEST_TOML,
        DEFAULT_MANIFEST_YAML,
        ".kiln.toml",
        ".kiln.yaml",
    ]
}
