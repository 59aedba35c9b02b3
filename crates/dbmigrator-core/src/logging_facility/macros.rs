//! Operation boundary macros
//!
//! Every engine operation emits exactly one start event and exactly one of
//! end / end_error. Field names come from `dbmigrator_core_types::schema`.

/// Log the start of an operation
///
/// ```
/// # use dbmigrator_core::log_op_start;
/// log_op_start!("up");
/// log_op_start!("up", quantity = 2);
/// ```
#[macro_export]
macro_rules! log_op_start {
    ($op:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
        );
    };
    ($op:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_START,
            $($field)*
        );
    };
}

/// Log the successful end of an operation
///
/// ```
/// # use dbmigrator_core::log_op_end;
/// log_op_end!("up", duration_ms = 42);
/// log_op_end!("up", duration_ms = 42, batch_len = 3);
/// ```
#[macro_export]
macro_rules! log_op_end {
    ($op:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
        );
    };
    ($op:expr, duration_ms = $duration:expr, $($field:tt)*) => {
        tracing::info!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END,
            duration_ms = $duration,
            $($field)*
        );
    };
}

/// Log a failed operation with the error's kind and code
///
/// ```
/// # use dbmigrator_core::log_op_error;
/// # use dbmigrator_core::errors::{ErrorKind, MigrateError};
/// let err = MigrateError::new(ErrorKind::NotFound);
/// log_op_error!("down", &err, duration_ms = 10);
/// ```
#[macro_export]
macro_rules! log_op_error {
    ($op:expr, $err:expr, duration_ms = $duration:expr) => {{
        let err: &$crate::errors::MigrateError = $err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?err.kind(),
            err.code = err.code(),
            migration_id = err.migration_id().unwrap_or(0),
        );
    }};
    ($op:expr, $err:expr, duration_ms = $duration:expr, $($field:tt)*) => {{
        let err: &$crate::errors::MigrateError = $err;
        tracing::error!(
            component = module_path!(),
            op = $op,
            event = $crate::core_types::schema::EVENT_END_ERROR,
            duration_ms = $duration,
            err.kind = ?err.kind(),
            err.code = err.code(),
            migration_id = err.migration_id().unwrap_or(0),
            $($field)*
        );
    }};
}
