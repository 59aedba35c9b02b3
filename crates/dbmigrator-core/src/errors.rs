use crate::model::MigrationId;
use thiserror::Error;

/// Result type alias using MigrateError
pub type Result<T> = std::result::Result<T, MigrateError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that hosts can match on without
/// parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No pending/applicable migrations, or no log rows for a query
    NotFound,
    /// The request conflicts with already-registered state
    BadRequest,
    /// Two migrations share an ID, or a log row would be inserted twice
    Duplicate,
    /// A migration failed structural validation at registration
    InvalidMigration,
    /// Unexpected storage failure
    Internal,
    /// A user-supplied SQL statement failed
    UserSqlError,
    /// A user-supplied callback returned an error or panicked
    UserCallbackError,
    /// An action tag is neither SQL text nor callback
    UndefinedActionType,
    /// An operation was invoked before the engine was constructed
    NotInitialised,
    /// Store configuration could not be loaded
    Configuration,
}

impl ErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "ERR_NOT_FOUND",
            ErrorKind::BadRequest => "ERR_BAD_REQUEST",
            ErrorKind::Duplicate => "ERR_DUPLICATE",
            ErrorKind::InvalidMigration => "ERR_INVALID_MIGRATION",
            ErrorKind::Internal => "ERR_INTERNAL",
            ErrorKind::UserSqlError => "ERR_USER_SQL",
            ErrorKind::UserCallbackError => "ERR_USER_CALLBACK",
            ErrorKind::UndefinedActionType => "ERR_UNDEFINED_ACTION_TYPE",
            ErrorKind::NotInitialised => "ERR_NOT_INITIALISED",
            ErrorKind::Configuration => "ERR_CONFIGURATION",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification (`kind`) for programmatic handling plus context
/// for humans: the operation that failed, the migration involved, and the
/// error it wraps. Registration failures are aggregated through `causes`.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrateError {
    kind: ErrorKind,
    op: Option<String>,
    migration_id: Option<MigrationId>,
    message: String,
    source: Option<Box<MigrateError>>,
    causes: Vec<MigrateError>,
}

impl MigrateError {
    /// Create a new error with the specified kind
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            op: None,
            migration_id: None,
            message: String::new(),
            source: None,
            causes: Vec::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add migration ID context
    pub fn with_migration_id(mut self, id: MigrationId) -> Self {
        self.migration_id = Some(id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: MigrateError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Attach the individual failures this error aggregates
    pub fn with_causes(mut self, causes: Vec<MigrateError>) -> Self {
        self.causes = causes;
        self
    }

    /// Wrap this error in a new one of the same kind with extra context.
    ///
    /// The migration ID is carried over so the outermost error still names
    /// the migration that failed.
    pub fn context(self, op: impl Into<String>, message: impl Into<String>) -> Self {
        let mut wrapped = MigrateError::new(self.kind)
            .with_op(op)
            .with_message(message);
        wrapped.migration_id = self.migration_id;
        wrapped.with_source(self)
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the migration ID context, if any
    pub fn migration_id(&self) -> Option<MigrationId> {
        self.migration_id
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&MigrateError> {
        self.source.as_deref()
    }

    /// Get the aggregated failures (empty unless this is an aggregate)
    pub fn causes(&self) -> &[MigrateError] {
        &self.causes
    }

    /// Report whether this error, its source chain, or any aggregated cause
    /// has `kind`
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            if err.kind == kind || err.causes.iter().any(|cause| cause.has_kind(kind)) {
                return true;
            }
            current = err.source_error();
        }
        false
    }
}

impl std::fmt::Display for MigrateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(id) = self.migration_id {
            write!(f, " (migration_id: {})", id)?;
        }
        if let Some(source) = &self.source {
            write!(f, " <- {}", source)?;
        }
        for cause in &self.causes {
            write!(f, "\n  - {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for MigrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Registration-time failures, accumulated by the catalog builder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Two registered migrations share an ID
    #[error("Duplicate migration ID: {id}")]
    DuplicateId { id: MigrationId },

    /// IDs start at 1
    #[error("Migration ID must be positive")]
    ZeroId,

    /// Name is missing, too long, or uses characters outside [A-Za-z0-9_-]
    #[error("Invalid migration #{id} name {name:?}: {reason}")]
    InvalidName {
        id: MigrationId,
        name: String,
        reason: String,
    },

    /// Up or Down is an empty SQL string
    #[error("Invalid migration #{id}: {direction} action is empty")]
    EmptyAction {
        id: MigrationId,
        direction: &'static str,
    },

    /// A migration with this ID is already part of a constructed catalog
    #[error("Migration #{id} already exists")]
    AlreadyRegistered { id: MigrationId },
}

impl CatalogError {
    /// ID of the migration the failure belongs to, when known
    pub fn migration_id(&self) -> Option<MigrationId> {
        match self {
            CatalogError::DuplicateId { id }
            | CatalogError::InvalidName { id, .. }
            | CatalogError::EmptyAction { id, .. }
            | CatalogError::AlreadyRegistered { id } => Some(*id),
            CatalogError::ZeroId => None,
        }
    }
}

/// Conversion from CatalogError to MigrateError
impl From<CatalogError> for MigrateError {
    fn from(err: CatalogError) -> Self {
        let kind = match &err {
            CatalogError::DuplicateId { .. } => ErrorKind::Duplicate,
            CatalogError::AlreadyRegistered { .. } => ErrorKind::BadRequest,
            CatalogError::ZeroId
            | CatalogError::InvalidName { .. }
            | CatalogError::EmptyAction { .. } => ErrorKind::InvalidMigration,
        };
        let mut ex = MigrateError::new(kind)
            .with_op("register")
            .with_message(err.to_string());
        if let Some(id) = err.migration_id() {
            ex = ex.with_migration_id(id);
        }
        ex
    }
}

/// Internal error for a storage failure described by `message`
pub fn internal(op: impl Into<String>, message: impl Into<String>) -> MigrateError {
    MigrateError::new(ErrorKind::Internal)
        .with_op(op)
        .with_message(message)
}

/// NotFound error for `op`
pub fn not_found(op: impl Into<String>, message: impl Into<String>) -> MigrateError {
    MigrateError::new(ErrorKind::NotFound)
        .with_op(op)
        .with_message(message)
}
