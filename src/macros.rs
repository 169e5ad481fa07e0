/// Embed a script file into the binary and register it under a bundled location
///
/// `$path` is relative to the calling crate's manifest directory; the script is
/// registered under its file name.
///
/// # Example
/// ```ignore
/// dbmigrate::bundle_script!("db/design", "sql/design/V1__create_accounts.sql");
/// adapter.migrate_db(false)?;
/// ```
#[macro_export]
macro_rules! bundle_script {
    ($location:expr, $path:literal) => {
        $crate::engine::resources::register_file(
            $location,
            $path,
            include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/", $path)),
        )
    };
}
