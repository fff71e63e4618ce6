//! Database dispatch macros for reducing code duplication.
//!
//! The sqlx backend wraps each driver's pool and connection in an enum with
//! one variant per database. These macros expand to the match over those
//! variants so each call site stays a single readable block.

/// Generate a match over the variants of a backend enum.
///
/// The first argument names the enum in `db::backend` (`DbPool` or
/// `DbConnection`), the second is the value matched on.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool, pool, {
///     MySql(p) => p.close().await,
///     Postgres(p) => p.close().await,
///     SQLite(p) => p.close().await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($kind:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $crate::db::backend::$kind::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
