// Date shift oracle - installation-wide random day offset for AI-bound dates

use crate::db::Database;
use crate::privacy::PrivacyError;
use chrono::{Duration, NaiveDate};
use rand::Rng;
use rusqlite::OptionalExtension;
use std::sync::Mutex;

const SHIFT_MIN_DAYS: i64 = 500;
const SHIFT_MAX_DAYS: i64 = 1500;

/// Shifts calendar dates by a constant random offset so real transaction
/// dates never reach an AI provider. The offset is sampled once per
/// installation and is immutable afterward: `unshift(shift(d)) == d` only
/// holds as long as the stored value never changes.
pub struct DateShiftOracle {
    db: Database,
    cached: Mutex<Option<i64>>,
}

impl DateShiftOracle {
    pub fn new(db: Database) -> Self {
        DateShiftOracle {
            db,
            cached: Mutex::new(None),
        }
    }

    /// The installation's shift value, seeding it on first use.
    ///
    /// Seeding is an INSERT OR IGNORE against the fixed singleton key:
    /// when two processes race, whichever write lands first wins and the
    /// loser re-reads rather than keeping its own candidate.
    pub fn shift_days(&self) -> Result<i64, PrivacyError> {
        {
            let cached = self.cached.lock().map_err(|_| PrivacyError::Lock)?;
            if let Some(days) = *cached {
                return Ok(days);
            }
        }

        let candidate: i64 = rand::thread_rng().gen_range(SHIFT_MIN_DAYS..=SHIFT_MAX_DAYS);

        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;
        conn.execute(
            "INSERT OR IGNORE INTO date_shifts (id, shift_days) VALUES (1, ?1)",
            [candidate],
        )?;
        let stored: Option<i64> = conn
            .query_row("SELECT shift_days FROM date_shifts WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        drop(conn);

        let days = stored.ok_or(PrivacyError::Singleton("date_shifts"))?;
        let mut cached = self.cached.lock().map_err(|_| PrivacyError::Lock)?;
        *cached = Some(days);
        Ok(days)
    }

    /// The stored shift value without seeding one, for stats display.
    pub fn current(&self) -> Result<Option<i64>, PrivacyError> {
        {
            let cached = self.cached.lock().map_err(|_| PrivacyError::Lock)?;
            if cached.is_some() {
                return Ok(*cached);
            }
        }
        let conn = self.db.get_connection();
        let conn = conn.lock().map_err(|_| PrivacyError::Lock)?;
        let stored: Option<i64> = conn
            .query_row("SELECT shift_days FROM date_shifts WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(stored)
    }

    pub fn shift(&self, date: NaiveDate) -> Result<NaiveDate, PrivacyError> {
        Ok(date + Duration::days(self.shift_days()?))
    }

    pub fn unshift(&self, date: NaiveDate) -> Result<NaiveDate, PrivacyError> {
        Ok(date - Duration::days(self.shift_days()?))
    }
}
