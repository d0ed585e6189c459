use sea_orm::{DbErr, RuntimeErr, SqlErr};

/// Classification helpers for [`DbErr`].
///
/// sea-orm only surfaces a handful of SQL error kinds through [`SqlErr`];
/// anything finer-grained (lock timeouts, read-only transactions) has to be
/// pulled out of the driver error's SQLSTATE code.
pub trait DbErrExt {
    fn is_unique_violation(&self) -> bool;

    /// Five-character SQLSTATE code of the underlying driver error, if any.
    fn sql_state(&self) -> Option<String>;

    /// True when the connection itself failed (as opposed to the statement).
    fn is_connection_lost(&self) -> bool;
}

impl DbErrExt for DbErr {
    fn is_unique_violation(&self) -> bool {
        matches!(self.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    }

    fn sql_state(&self) -> Option<String> {
        match self {
            DbErr::Conn(RuntimeErr::SqlxError(e))
            | DbErr::Exec(RuntimeErr::SqlxError(e))
            | DbErr::Query(RuntimeErr::SqlxError(e)) => e
                .as_database_error()
                .and_then(|db| db.code())
                .map(|code| code.into_owned()),
            _ => None,
        }
    }

    fn is_connection_lost(&self) -> bool {
        matches!(self, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
    }
}
