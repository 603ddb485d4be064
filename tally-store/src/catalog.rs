//! Budget categories and transactions. These tables belong to the surrounding
//! budgeting app; the helpers here exist for seeding, the CLI and imports.

use rusqlite::{params, OptionalExtension, Row};
use tally_core::{
    BudgetCategory, NewTransaction, Result, SuggestError, TransactionRecord, TransactionSink,
};

use crate::database::{get_date, SqliteStore};

pub(crate) const CATEGORY_COLUMNS: &str = "c.id, c.budget_id, c.name, c.sort_order, c.is_active";

pub(crate) fn row_to_category(row: &Row<'_>, offset: usize) -> rusqlite::Result<BudgetCategory> {
    Ok(BudgetCategory {
        id: row.get(offset)?,
        budget_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        sort_order: row.get(offset + 3)?,
        is_active: row.get(offset + 4)?,
    })
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    Ok(TransactionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        budget_id: row.get(2)?,
        category_id: row.get(3)?,
        amount_cents: row.get(4)?,
        date: get_date(row, 5)?,
        notes: row.get(6)?,
        is_split: row.get(7)?,
    })
}

impl SqliteStore {
    /// Create an active category at the end of the budget's display order.
    pub fn add_category(&self, budget_id: i64, name: &str) -> Result<BudgetCategory> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SuggestError::invalid("category name must not be empty"));
        }
        self.with_conn(|conn| {
            let sort_order: i32 = conn.query_row(
                "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM budget_categories WHERE budget_id = ?1",
                [budget_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO budget_categories (budget_id, name, sort_order, is_active)
                 VALUES (?1, ?2, ?3, 1)",
                params![budget_id, name, sort_order],
            )?;
            Ok(BudgetCategory {
                id: conn.last_insert_rowid(),
                budget_id,
                name: name.to_string(),
                sort_order,
                is_active: true,
            })
        })
    }

    /// Hide a category from suggestions. Returns false when no such category exists.
    pub fn deactivate_category(&self, category_id: i64) -> Result<bool> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE budget_categories SET is_active = 0 WHERE id = ?1",
                [category_id],
            )
        })?;
        Ok(changed > 0)
    }

    pub fn get_category(&self, category_id: i64) -> Result<Option<BudgetCategory>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM budget_categories c WHERE c.id = ?1"),
                [category_id],
                |row| row_to_category(row, 0),
            )
            .optional()
        })
    }

    /// Categories of a budget in display order.
    pub fn list_categories(&self, budget_id: i64, include_inactive: bool) -> Result<Vec<BudgetCategory>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM budget_categories c
                 WHERE c.budget_id = ?1 AND (?2 OR c.is_active = 1)
                 ORDER BY c.sort_order, c.id"
            ))?;
            let rows = stmt.query_map(params![budget_id, include_inactive], |row| {
                row_to_category(row, 0)
            })?;
            rows.collect()
        })
    }

    pub fn add_transaction(&self, txn: NewTransaction) -> Result<TransactionRecord> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO transactions (user_id, budget_id, category_id, amount_cents, date, notes, is_split)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    txn.user_id,
                    txn.budget_id,
                    txn.category_id,
                    txn.amount_cents,
                    txn.date.format("%Y-%m-%d").to_string(),
                    txn.notes,
                    txn.is_split,
                ],
            )?;
            Ok(txn.with_id(conn.last_insert_rowid()))
        })
    }

    /// A user's transactions, newest first.
    pub fn list_transactions(&self, user_id: i64, limit: usize) -> Result<Vec<TransactionRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, budget_id, category_id, amount_cents, date, notes, is_split
                 FROM transactions
                 WHERE user_id = ?1
                 ORDER BY date DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![user_id, limit as i64], row_to_transaction)?;
            rows.collect()
        })
    }
}

impl TransactionSink for SqliteStore {
    fn insert_transaction(&self, txn: NewTransaction) -> Result<TransactionRecord> {
        self.add_transaction(txn)
    }
}
