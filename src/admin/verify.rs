use std::collections::BTreeMap;

use serde::Serialize;

use crate::schema::{EntityType, Relation};
use crate::store::rows::Alias;
use crate::store::{Session, Store};
use crate::types::{DependentRecord, EntityRecord, Iteration, Result, FIRST_ITERATION};

const MAX_FINDINGS: usize = 32;

/// Specifies the depth of verification checks to perform.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyLevel {
    /// Aggregate checks answered by SQL without loading rows.
    Fast,
    /// Loads every row and checks each history and interval chain.
    Full,
}

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Informational message about the verification process.
    Info,
    /// Suspicious but not contradicting any ledger rule.
    Warning,
    /// A ledger or interval rule is broken.
    Error,
}

/// A single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Table the finding was raised for.
    pub table: String,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected during verification.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Distinct entity ids.
    pub entities: u64,
    /// Entity rows, archived ones included.
    pub entity_rows: u64,
    /// Distinct dependent ids.
    pub dependents: u64,
    /// Interval rows, closed ones included.
    pub intervals: u64,
    /// Intervals still in effect.
    pub open_intervals: u64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// The verification level that was performed.
    pub level: VerifyLevel,
    /// Whether no error-level finding was raised.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Whether findings were dropped because of the cap.
    pub truncated: bool,
    /// Statistics about the rows examined.
    pub counts: VerifyCounts,
}

#[derive(Default)]
struct Findings {
    items: Vec<VerifyFinding>,
    truncated: bool,
}

impl Findings {
    fn push(&mut self, severity: VerifySeverity, table: &str, message: impl Into<String>) {
        if self.items.len() < MAX_FINDINGS {
            self.items.push(VerifyFinding {
                severity,
                table: table.to_string(),
                message: message.into(),
            });
        } else {
            self.truncated = true;
        }
    }

    fn error(&mut self, table: &str, message: impl Into<String>) {
        self.push(VerifySeverity::Error, table, message);
    }

    fn warning(&mut self, table: &str, message: impl Into<String>) {
        self.push(VerifySeverity::Warning, table, message);
    }
}

/// Checks every entity history and every interval chain in `store`.
///
/// The checks run inside one transaction that writes nothing. Findings are
/// reported, never repaired.
///
/// # Errors
///
/// Returns an error only if the store cannot be read.
pub fn verify(store: &mut Store, level: VerifyLevel) -> Result<VerifyReport> {
    let lookup = store.lookup();
    let (findings, counts) = store.transaction(|cx| {
        let mut findings = Findings::default();
        let mut counts = VerifyCounts::default();
        match level {
            VerifyLevel::Fast => fast_checks(cx, &mut findings, &mut counts)?,
            VerifyLevel::Full => {
                let schema = cx.schema();
                let mut current: BTreeMap<String, BTreeMap<String, Iteration>> = BTreeMap::new();
                for ty in schema.entity_types() {
                    let entity_type = schema.entity(ty);
                    let rows: Vec<EntityRecord> =
                        lookup.scan(cx, &entity_type.table, Alias::History, None)?;
                    let latest = check_entities(entity_type, rows, &mut findings, &mut counts);
                    current.insert(entity_type.name.clone(), latest);
                }
                for relation in schema.relations() {
                    let rel = schema.relation(relation);
                    let rows: Vec<DependentRecord> =
                        lookup.scan(cx, &rel.table, Alias::History, None)?;
                    let owner_name = &schema.entity(rel.owner).name;
                    let other_name = rel.other.map(|ty| &schema.entity(ty).name);
                    let empty = BTreeMap::new();
                    let owners = current.get(owner_name).unwrap_or(&empty);
                    let others = other_name.and_then(|name| current.get(name));
                    check_intervals(rel, rows, owners, others, &mut findings, &mut counts);
                }
            }
        }
        Ok((findings, counts))
    })?;
    let success = !findings
        .items
        .iter()
        .any(|f| f.severity == VerifySeverity::Error);
    tracing::info!(
        findings = findings.items.len(),
        truncated = findings.truncated,
        success,
        "admin.verify"
    );
    Ok(VerifyReport {
        level,
        success,
        findings: findings.items,
        truncated: findings.truncated,
        counts,
    })
}

fn fast_checks(cx: &Session<'_>, findings: &mut Findings, counts: &mut VerifyCounts) -> Result<()> {
    let conn = cx.conn();
    let schema = cx.schema();
    for ty in schema.entity_types() {
        let table = &schema.entity(ty).table;
        let (rows, ids, latest): (i64, i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT id), COALESCE(SUM(latest), 0) FROM {table}"
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        counts.entity_rows += rows as u64;
        counts.entities += ids as u64;
        if latest != ids {
            findings.error(
                table,
                format!("{ids} entities but {latest} rows flagged latest"),
            );
        }
    }
    for relation in schema.relations() {
        let table = &schema.relation(relation).table;
        let (rows, ids, open, inverted): (i64, i64, i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT id), \
                 COALESCE(SUM(last_iteration = {inf}), 0), \
                 COALESCE(SUM(first_iteration > last_iteration), 0) FROM {table}",
                inf = crate::types::INFINITY
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        counts.intervals += rows as u64;
        counts.dependents += ids as u64;
        counts.open_intervals += open as u64;
        if inverted > 0 {
            findings.error(table, format!("{inverted} intervals end before they start"));
        }
    }
    Ok(())
}

// Returns the current iteration of every id with exactly one latest row.
fn check_entities(
    entity_type: &EntityType,
    rows: Vec<EntityRecord>,
    findings: &mut Findings,
    counts: &mut VerifyCounts,
) -> BTreeMap<String, Iteration> {
    let table = &entity_type.table;
    counts.entity_rows += rows.len() as u64;
    let mut by_id: BTreeMap<String, Vec<EntityRecord>> = BTreeMap::new();
    for row in rows {
        by_id.entry(row.id.0.clone()).or_default().push(row);
    }
    counts.entities += by_id.len() as u64;

    let mut current = BTreeMap::new();
    for (id, mut history) in by_id {
        history.sort_by_key(|row| row.iteration);
        for (expected, row) in (FIRST_ITERATION..).zip(&history) {
            if row.iteration != expected {
                findings.error(
                    table,
                    format!(
                        "entity '{id}' history is not contiguous: expected iteration {expected}, found {}",
                        row.iteration
                    ),
                );
                break;
            }
        }
        let latest: Vec<&EntityRecord> = history.iter().filter(|row| row.latest).collect();
        match latest.as_slice() {
            [] => findings.error(table, format!("entity '{id}' has no latest row")),
            [row] => {
                let max = history.last().map_or(row.iteration, |r| r.iteration);
                if row.iteration != max {
                    findings.error(
                        table,
                        format!(
                            "entity '{id}' latest row is iteration {} but history reaches {max}",
                            row.iteration
                        ),
                    );
                }
                current.insert(id.clone(), row.iteration);
            }
            many => findings.error(
                table,
                format!("entity '{id}' has {} latest rows", many.len()),
            ),
        }
        if history
            .iter()
            .filter(|row| !row.latest)
            .any(|row| row.update_note.as_deref().map_or(true, str::is_empty))
        {
            findings.warning(table, format!("entity '{id}' has archived rows without a note"));
        }
    }
    current
}

fn check_intervals(
    rel: &Relation,
    rows: Vec<DependentRecord>,
    owners: &BTreeMap<String, Iteration>,
    others: Option<&BTreeMap<String, Iteration>>,
    findings: &mut Findings,
    counts: &mut VerifyCounts,
) {
    let table = &rel.table;
    counts.intervals += rows.len() as u64;
    let mut by_id: BTreeMap<String, Vec<DependentRecord>> = BTreeMap::new();
    for row in rows {
        by_id.entry(row.id.0.clone()).or_default().push(row);
    }
    counts.dependents += by_id.len() as u64;

    for (id, mut chain) in by_id {
        chain.sort_by_key(|row| row.first_iteration);
        let open = chain.iter().filter(|row| row.is_open()).count();
        counts.open_intervals += open as u64;
        if open > 1 {
            findings.error(table, format!("dependent '{id}' has {open} open intervals"));
        }
        for row in &chain {
            if row.first_iteration > row.last_iteration {
                findings.error(
                    table,
                    format!(
                        "dependent '{id}' interval [{}, {}] ends before it starts",
                        row.first_iteration, row.last_iteration
                    ),
                );
            }
            if row.owner != chain[0].owner {
                findings.error(
                    table,
                    format!("dependent '{id}' changes owner from '{}' to '{}'", chain[0].owner, row.owner),
                );
            }
            match owners.get(row.owner.as_str()) {
                None => findings.error(
                    table,
                    format!("dependent '{id}' references missing owner '{}'", row.owner),
                ),
                Some(&owner_at) => {
                    if !row.is_open() && row.last_iteration >= owner_at {
                        findings.error(
                            table,
                            format!(
                                "dependent '{id}' closed at {} but owner '{}' is only at {owner_at}",
                                row.last_iteration, row.owner
                            ),
                        );
                    }
                    if row.first_iteration > owner_at {
                        findings.error(
                            table,
                            format!(
                                "dependent '{id}' opens at {} beyond owner '{}' iteration {owner_at}",
                                row.first_iteration, row.owner
                            ),
                        );
                    }
                }
            }
            if let (Some(others), Some(other)) = (others, row.other.as_ref()) {
                if !others.contains_key(other.as_str()) {
                    findings.warning(
                        table,
                        format!("dependent '{id}' points at missing '{other}'"),
                    );
                }
            }
        }
        for pair in chain.windows(2) {
            let (prev, next) = (pair[0].window(), pair[1].window());
            if prev.overlaps(&next) {
                findings.error(
                    table,
                    format!(
                        "dependent '{id}' intervals [{}, {}] and [{}, {}] overlap",
                        prev.first, prev.last, next.first, next.last
                    ),
                );
            } else if !prev.abuts(&next) {
                findings.error(
                    table,
                    format!(
                        "dependent '{id}' has a gap between iterations {} and {}",
                        prev.last, next.first
                    ),
                );
            }
        }
    }
}
