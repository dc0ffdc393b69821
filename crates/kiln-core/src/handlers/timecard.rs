// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Employee and timecard handlers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::persistence::{EmployeeRecord, TimeEntryRecord};
use crate::timesheet::{TimecardSummary, summarize};

use super::HandlerState;

/// Input for [`create_employee`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewEmployee {
    /// Full name.
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Job role.
    #[serde(default)]
    pub role: Option<String>,
    /// Hourly pay.
    pub hourly_rate_cents: i64,
}

fn require_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
    if from >= to {
        return Err(CoreError::validation("to", "must be after 'from'"));
    }
    Ok(())
}

/// Add an employee.
#[instrument(skip(state, input), fields(name = %input.name))]
pub async fn create_employee(state: &HandlerState, input: NewEmployee) -> Result<EmployeeRecord> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(CoreError::validation("name", "must not be empty"));
    }
    if input.hourly_rate_cents < 0 {
        return Err(CoreError::validation("hourly_rate_cents", "must not be negative"));
    }

    let employee = EmployeeRecord {
        employee_id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: input.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        role: input.role.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        hourly_rate_cents: input.hourly_rate_cents,
        active: true,
        created_at: Utc::now(),
    };

    state.persistence.insert_employee(&employee).await?;

    info!(employee_id = %employee.employee_id, "Employee created");
    Ok(employee)
}

/// Get an employee by ID.
pub async fn get_employee(state: &HandlerState, employee_id: &str) -> Result<EmployeeRecord> {
    state
        .persistence
        .get_employee(employee_id)
        .await?
        .ok_or_else(|| CoreError::not_found("employee", employee_id))
}

/// List employees, optionally only active ones.
pub async fn list_employees(state: &HandlerState, active_only: bool) -> Result<Vec<EmployeeRecord>> {
    state.persistence.list_employees(active_only).await
}

/// Deactivate an employee. Past entries are kept.
#[instrument(skip(state))]
pub async fn deactivate_employee(state: &HandlerState, employee_id: &str) -> Result<EmployeeRecord> {
    if !state
        .persistence
        .set_employee_active(employee_id, false)
        .await?
    {
        return Err(CoreError::not_found("employee", employee_id));
    }

    info!("Employee deactivated");
    get_employee(state, employee_id).await
}

/// Open a time entry for an active employee.
#[instrument(skip(state, note))]
pub async fn clock_in(
    state: &HandlerState,
    employee_id: &str,
    note: Option<String>,
) -> Result<TimeEntryRecord> {
    let employee = get_employee(state, employee_id).await?;
    if !employee.active {
        return Err(CoreError::invalid_state(
            "employee",
            employee_id,
            "active",
            "inactive",
        ));
    }

    let now = Utc::now();
    let entry = TimeEntryRecord {
        entry_id: Uuid::new_v4().to_string(),
        employee_id: employee_id.to_string(),
        clock_in: now,
        clock_out: None,
        note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        created_at: now,
    };

    state.persistence.open_time_entry(&entry).await?;

    info!(entry_id = %entry.entry_id, "Clocked in");
    Ok(entry)
}

/// Close the employee's open time entry.
#[instrument(skip(state))]
pub async fn clock_out(state: &HandlerState, employee_id: &str) -> Result<TimeEntryRecord> {
    get_employee(state, employee_id).await?;

    let entry = state
        .persistence
        .close_open_time_entry(employee_id, Utc::now())
        .await?
        .ok_or_else(|| CoreError::NotClockedIn {
            employee_id: employee_id.to_string(),
        })?;

    info!(entry_id = %entry.entry_id, "Clocked out");
    Ok(entry)
}

/// Correct the times of an entry. `clock_out: None` reopens it.
#[instrument(skip(state))]
pub async fn adjust_entry(
    state: &HandlerState,
    entry_id: &str,
    clock_in: DateTime<Utc>,
    clock_out: Option<DateTime<Utc>>,
) -> Result<TimeEntryRecord> {
    if let Some(out) = clock_out
        && out < clock_in
    {
        return Err(CoreError::validation("clock_out", "must not be before clock_in"));
    }

    if !state
        .persistence
        .update_time_entry(entry_id, clock_in, clock_out)
        .await?
    {
        return Err(CoreError::not_found("time_entry", entry_id));
    }

    info!("Time entry adjusted");
    state
        .persistence
        .get_time_entry(entry_id)
        .await?
        .ok_or_else(|| CoreError::not_found("time_entry", entry_id))
}

/// Entries of one employee overlapping `[from, to)`.
pub async fn list_entries(
    state: &HandlerState,
    employee_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TimeEntryRecord>> {
    require_range(from, to)?;
    get_employee(state, employee_id).await?;
    state
        .persistence
        .list_time_entries(Some(employee_id), from, to)
        .await
}

/// Worked minutes and pay for every active employee in `[from, to)`.
#[instrument(skip(state))]
pub async fn timecard_summary(
    state: &HandlerState,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<TimecardSummary>> {
    require_range(from, to)?;
    let now = Utc::now();

    let employees = state.persistence.list_employees(true).await?;
    let mut by_employee: HashMap<String, Vec<TimeEntryRecord>> = HashMap::new();
    for entry in state.persistence.list_time_entries(None, from, to).await? {
        by_employee
            .entry(entry.employee_id.clone())
            .or_default()
            .push(entry);
    }

    let summaries = employees
        .into_iter()
        .map(|employee| {
            let entries = by_employee.remove(&employee.employee_id).unwrap_or_default();
            let worked = summarize(&entries, from, to, now, employee.hourly_rate_cents);
            TimecardSummary {
                employee_id: employee.employee_id,
                name: employee.name,
                total_minutes: worked.total_minutes,
                open_entry: worked.open_entry,
                pay_cents: worked.pay_cents,
                entries,
            }
        })
        .collect();

    Ok(summaries)
}
