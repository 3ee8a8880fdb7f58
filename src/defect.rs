// Defect management: look up a defect, or update the fields of one or more
// defects. Updates run one defect at a time; a failure is recorded and the
// next defect is still attempted. Nothing is rolled back.

use crate::api::KualiteeApi;
use crate::csv_input;
use crate::models::{DefectDetails, DefectUpdate, RCA_FIELD, RCA_OPTIONS};
use crate::ui;
use anyhow::Result;
use dialoguer::{Confirm, Input};
use serde::Deserialize;
use std::path::Path;
use tracing::{error, info};

pub const CLOSE_STATUS: &str = "close";
pub const PRIORITY_FIELD: &str = "priority";
pub const ASSIGNEE_FIELD: &str = "assignedto";

const CSV_COLUMNS: &[&str] = &["defect_id", "status", "RCA"];

/// Entry point from the main menu.
pub fn run<A: KualiteeApi>(api: &A) -> Result<()> {
    loop {
        ui::header(Some("Defect Management"));
        let items = vec![
            "Update defects".to_string(),
            "Search defect by ID".to_string(),
            "Update bulk defects (CSV)".to_string(),
            "Back to main menu".to_string(),
        ];
        let result = match ui::pick("Choose an action", &items)? {
            Some(0) => update_defects(api),
            Some(1) => search_defect(api),
            Some(2) => update_from_csv(api),
            _ => return Ok(()),
        };
        if let Err(e) = result {
            error!("Defect action failed: {:#}", e);
            ui::print_error(&format!("Error: {:#}", e));
            ui::pause();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefectOutcome {
    Updated,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectResult {
    pub defect_id: String,
    pub outcome: DefectOutcome,
}

/// Per-defect results of one batch, in submission order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub results: Vec<DefectResult>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, DefectOutcome::Updated))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DefectOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DefectOutcome::Skipped(_)))
    }

    fn count(&self, pred: impl Fn(&DefectOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn print(&self) {
        let rows: Vec<Vec<String>> = self
            .results
            .iter()
            .map(|r| {
                let (result, detail) = match &r.outcome {
                    DefectOutcome::Updated => ("Updated", String::new()),
                    DefectOutcome::Failed(why) => ("Failed", why.clone()),
                    DefectOutcome::Skipped(why) => ("Skipped", why.clone()),
                };
                vec![r.defect_id.clone(), result.to_string(), detail]
            })
            .collect();
        ui::print_table(Some("Summary"), &["Defect ID", "Result", "Detail"], &rows);
        for line in ui::batch_totals(self.succeeded(), self.failed(), self.skipped()) {
            line.print();
        }
    }
}

/// An update paired with the defect's record as fetched before sending.
#[derive(Debug, Clone)]
pub struct PreparedUpdate {
    pub update: DefectUpdate,
    pub current: Result<DefectDetails, String>,
}

impl PreparedUpdate {
    /// Outcome known before sending anything: the fetch failed, or the
    /// defect already has the requested status.
    pub fn precheck(&self) -> Option<DefectOutcome> {
        match &self.current {
            Err(why) => Some(DefectOutcome::Failed(why.clone())),
            Ok(details) => {
                let current = details.status();
                match self.update.status() {
                    Some(target) if !current.is_empty() && current.eq_ignore_ascii_case(target) => {
                        Some(DefectOutcome::Skipped(format!("Already {}", current)))
                    }
                    _ => None,
                }
            }
        }
    }
}

/// Fetch the current record of every defect, one request at a time.
pub fn prepare_updates<A: KualiteeApi + ?Sized>(api: &A, updates: Vec<DefectUpdate>) -> Vec<PreparedUpdate> {
    updates
        .into_iter()
        .map(|update| {
            let current = api.defect_details(&update.defect_id).map_err(|e| {
                error!("Failed to fetch defect {}: {}", update.defect_id, e);
                format!("Could not fetch defect: {}", e)
            });
            PreparedUpdate { update, current }
        })
        .collect()
}

/// Send every prepared update in order. `on_result` sees each outcome as
/// soon as it is known.
pub fn apply_prepared<A: KualiteeApi + ?Sized>(
    api: &A,
    prepared: &[PreparedUpdate],
    mut on_result: impl FnMut(&DefectResult),
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for item in prepared {
        let outcome = match (item.precheck(), &item.current) {
            (Some(outcome), _) => outcome,
            (None, Ok(details)) => match api.update_defect(&item.update, details) {
                Ok(()) => DefectOutcome::Updated,
                Err(e) => {
                    error!("Failed to update defect {}: {}", item.update.defect_id, e);
                    DefectOutcome::Failed(e.to_string())
                }
            },
            // precheck covers every Err
            (None, Err(why)) => DefectOutcome::Failed(why.clone()),
        };
        let result = DefectResult {
            defect_id: item.update.defect_id.clone(),
            outcome,
        };
        on_result(&result);
        summary.results.push(result);
    }
    info!(
        "Defect batch done: {} updated, {} failed, {} skipped",
        summary.succeeded(),
        summary.failed(),
        summary.skipped()
    );
    summary
}

/// Fetch and update each defect in turn.
pub fn apply_updates<A: KualiteeApi + ?Sized>(
    api: &A,
    updates: Vec<DefectUpdate>,
    on_result: impl FnMut(&DefectResult),
) -> BatchSummary {
    let prepared = prepare_updates(api, updates);
    apply_prepared(api, &prepared, on_result)
}

/// Split user input on commas and whitespace, dropping blanks and repeats.
pub fn parse_defect_ids(input: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in input.split(|c: char| c == ',' || c.is_whitespace()) {
        let id = id.trim();
        if !id.is_empty() && !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

fn print_result_line(result: &DefectResult) {
    match &result.outcome {
        DefectOutcome::Updated => ui::print_success(&format!("{} updated", result.defect_id)),
        DefectOutcome::Failed(why) => ui::print_error(&format!("{}: {}", result.defect_id, why)),
        DefectOutcome::Skipped(why) => {
            ui::print_warning(&format!("{} skipped: {}", result.defect_id, why))
        }
    }
}

fn print_preview(prepared: &[PreparedUpdate], extra_skips: &[(String, String)]) -> usize {
    let mut will_update = 0;
    let mut rows: Vec<Vec<String>> = Vec::new();
    for p in prepared {
        let current = p
            .current
            .as_ref()
            .map(|d| d.field_or_na("uc_status"))
            .unwrap_or_else(|_| "-".into());
        let new_status = p.update.status().unwrap_or("(unchanged)").to_string();
        let rca = p
            .update
            .fields
            .get(RCA_FIELD)
            .map(|r| r.chars().take(40).collect::<String>())
            .unwrap_or_default();
        if p.precheck().is_none() {
            will_update += 1;
        }
        let result = preview_label(p);
        rows.push(vec![p.update.defect_id.clone(), current, new_status, rca, result]);
    }
    for (id, why) in extra_skips {
        rows.push(vec![
            id.clone(),
            "-".into(),
            "-".into(),
            "-".into(),
            format!("Skip: {}", why),
        ]);
    }
    ui::print_table(
        Some("Preview"),
        &["Defect ID", "Current Status", "New Status", "RCA", "Result"],
        &rows,
    );
    println!(
        "\n{} to update, {} not updated",
        will_update,
        prepared.len() - will_update + extra_skips.len()
    );
    will_update
}

/// Result column of the preview; matches how the summary will count it.
fn preview_label(p: &PreparedUpdate) -> String {
    match p.precheck() {
        None | Some(DefectOutcome::Updated) => "Will update".to_string(),
        Some(DefectOutcome::Failed(why)) => format!("Fail: {}", why),
        Some(DefectOutcome::Skipped(why)) => format!("Skip: {}", why),
    }
}

/// Summary for a batch where nothing is sent: every item's outcome is
/// already known from `precheck`, plus the rows rejected before fetching.
pub fn precheck_summary(prepared: &[PreparedUpdate], extra_skips: &[(String, String)]) -> BatchSummary {
    let mut results: Vec<DefectResult> = prepared
        .iter()
        .filter_map(|p| {
            p.precheck().map(|outcome| DefectResult {
                defect_id: p.update.defect_id.clone(),
                outcome,
            })
        })
        .collect();
    results.extend(extra_skips.iter().map(|(id, why)| DefectResult {
        defect_id: id.clone(),
        outcome: DefectOutcome::Skipped(why.clone()),
    }));
    BatchSummary { results }
}

/// Core flow: ids and field values from the user, then one update per id.
fn update_defects<A: KualiteeApi>(api: &A) -> Result<()> {
    let Some(raw) = ui::prompt_optional("Defect ID(s), comma or space separated (blank to cancel)")? else {
        return Ok(());
    };
    let ids = parse_defect_ids(&raw);
    if ids.is_empty() {
        return Ok(());
    }

    let status: String = Input::new()
        .with_prompt("New status ('-' to leave unchanged)")
        .default(CLOSE_STATUS.to_string())
        .interact_text()?;
    let status = status.trim();

    let mut rca_items = vec!["(leave unchanged)".to_string()];
    rca_items.extend(RCA_OPTIONS.iter().map(|s| s.to_string()));
    let rca = match ui::pick("Root Cause Analysis (RCA)", &rca_items)? {
        Some(idx) if idx > 0 => Some(RCA_OPTIONS[idx - 1]),
        _ => None,
    };
    let priority = ui::prompt_optional("Priority (blank to leave unchanged)")?;
    let assignee = ui::prompt_optional("Assignee (blank to leave unchanged)")?;

    let updates: Vec<DefectUpdate> = ids
        .iter()
        .map(|id| {
            let mut u = DefectUpdate::new(id.as_str());
            if !status.is_empty() && status != "-" {
                u = u.set("status", status);
            }
            if let Some(rca) = rca {
                u = u.set(RCA_FIELD, rca);
            }
            if let Some(p) = &priority {
                u = u.set(PRIORITY_FIELD, p.as_str());
            }
            if let Some(a) = &assignee {
                u = u.set(ASSIGNEE_FIELD, a.as_str());
            }
            u
        })
        .collect();
    if updates.iter().all(|u| u.fields.is_empty()) {
        ui::print_warning("Nothing to update");
        ui::pause();
        return Ok(());
    }

    let spinner = ui::spinner(&format!("Fetching {} defect(s)...", updates.len()));
    let prepared = prepare_updates(api, updates);
    spinner.finish_and_clear();
    if print_preview(&prepared, &[]) == 0 {
        ui::print_warning("No valid defects to update");
        precheck_summary(&prepared, &[]).print();
        ui::pause();
        return Ok(());
    }
    if !Confirm::new()
        .with_prompt("Proceed?")
        .default(false)
        .interact()?
    {
        ui::print_warning("Update cancelled");
        ui::pause();
        return Ok(());
    }

    ui::print_info("\nUpdating defects...");
    let summary = apply_prepared(api, &prepared, print_result_line);
    summary.print();
    ui::pause();
    Ok(())
}

fn search_defect<A: KualiteeApi>(api: &A) -> Result<()> {
    let Some(defect_id) = ui::prompt_optional("Enter defect ID to search (blank to cancel)")? else {
        return Ok(());
    };
    let spinner = ui::spinner("Fetching defect details...");
    let details = api.defect_details(&defect_id);
    spinner.finish_and_clear();

    match details {
        Ok(details) => print_details(&defect_id, &details),
        Err(e) => ui::print_warning(&format!("No defect found with ID {}: {}", defect_id, e)),
    }
    ui::pause();
    Ok(())
}

fn print_details(defect_id: &str, d: &DefectDetails) {
    ui::header(Some(&format!("Defect #{}", d.field("id").unwrap_or_else(|| defect_id.to_string()))));

    let title: String = d.field_or_na("description").chars().take(100).collect();
    println!("\nBasic Information:");
    println!("  Title:    {}", title);
    for (label, key) in [
        ("Status", "uc_status"),
        ("Severity", "uc_severity"),
        ("Priority", "uc_priority"),
        ("Type", "uc_defect_type"),
        ("OS", "uc_os_type"),
        ("Devices", "uc_devices"),
        ("Created", "created_on"),
        ("Aging", "defect_aging"),
    ] {
        println!("  {:<9} {}", format!("{}:", label), d.field_or_na(key));
    }

    println!("\nBuild & Module:");
    for (label, key) in [("Build", "build_name"), ("Module", "module_name"), ("Cycle", "cycle_name")] {
        println!("  {:<9} {}", format!("{}:", label), d.field_or_na(key));
    }

    let custom = d.custom_fields();
    if !custom.is_empty() {
        println!("\nCustom Fields:");
        for (label, value) in custom {
            println!("  {}: {}", label, value);
        }
    }

    let comments = d.comments();
    if !comments.is_empty() {
        println!("\nComments History:");
        for c in comments {
            println!("  [{}] {} -> {}", c.date, c.commented_by, c.status);
            if !c.comment.is_empty() {
                println!("    {}", c.comment);
            }
        }
    }
}

/// One CSV line of a bulk defect update.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DefectRow {
    pub defect_id: String,
    pub status: String,
    #[serde(rename = "RCA")]
    pub rca: String,
}

/// Turn CSV rows into updates. Only closing is supported in bulk; other
/// statuses are skipped with a reason.
pub fn plan_csv_rows(rows: &[DefectRow]) -> (Vec<DefectUpdate>, Vec<(String, String)>) {
    let mut updates = Vec::new();
    let mut skipped = Vec::new();
    for row in rows {
        if row.defect_id.is_empty() {
            skipped.push(("(blank)".to_string(), "Missing defect_id".to_string()));
        } else if !row.status.eq_ignore_ascii_case(CLOSE_STATUS) {
            skipped.push((
                row.defect_id.clone(),
                format!("Invalid status: {} (must be \"{}\")", row.status, CLOSE_STATUS),
            ));
        } else {
            updates.push(
                DefectUpdate::new(row.defect_id.as_str())
                    .set("status", CLOSE_STATUS)
                    .set(RCA_FIELD, row.rca.as_str()),
            );
        }
    }
    (updates, skipped)
}

fn update_from_csv<A: KualiteeApi>(api: &A) -> Result<()> {
    ui::print_table(
        Some("Required CSV Format"),
        CSV_COLUMNS,
        &[
            vec!["265744".into(), "close".into(), "Configuration: Bug".into()],
            vec!["265745".into(), "close".into(), "Code: Bug".into()],
        ],
    );
    println!("Status must be 'close' (case-insensitive).");

    let Some(raw) = ui::prompt_optional("Enter CSV file path (blank to cancel)")? else {
        return Ok(());
    };
    let rows: Vec<DefectRow> = csv_input::load_rows(Path::new(&ui::clean_path(&raw)), CSV_COLUMNS)?;
    let (updates, csv_skips) = plan_csv_rows(&rows);

    let spinner = ui::spinner(&format!("Fetching details for {} defects...", updates.len()));
    let prepared = prepare_updates(api, updates);
    spinner.finish_and_clear();

    if print_preview(&prepared, &csv_skips) == 0 {
        ui::print_warning("No valid defects to update");
        precheck_summary(&prepared, &csv_skips).print();
        ui::pause();
        return Ok(());
    }
    let confirm: String = Input::new()
        .with_prompt("Proceed with bulk update? (yes/no)")
        .default("no".to_string())
        .interact_text()?;
    if !confirm.trim().eq_ignore_ascii_case("yes") {
        ui::print_warning("Update cancelled");
        ui::pause();
        return Ok(());
    }

    ui::print_info("\nUpdating defects...");
    let mut summary = apply_prepared(api, &prepared, print_result_line);
    summary
        .results
        .extend(csv_skips.into_iter().map(|(defect_id, why)| DefectResult {
            defect_id,
            outcome: DefectOutcome::Skipped(why),
        }));
    summary.print();
    ui::pause();
    Ok(())
}
