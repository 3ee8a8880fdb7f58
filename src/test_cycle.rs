// Test cycle management: record execution results for test cases in a
// cycle, optionally attaching evidence, one at a time or from a CSV file.

use crate::api::KualiteeApi;
use crate::csv_input;
use crate::error::{ApiError, ValidationError};
use crate::models::{Cycle, ExecutionStatus, TestCase, TestCycleUpdate};
use crate::ui::{self, Notice};
use anyhow::Result;
use dialoguer::{Confirm, Input};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// File types the service accepts as execution evidence.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "gif", "jpg", "png", "jpeg", "pdf", "docx", "csv", "xls", "ppt", "mp4", "webm", "msg", "eml",
    "zip", "xml", "pcap",
];

const CSV_COLUMNS: &[&str] = &["test_case_name", "status", "attachment"];

/// Entry point from the main menu.
pub fn run<A: KualiteeApi>(api: &A) -> Result<()> {
    loop {
        ui::header(Some("Test Cycle Management"));
        let items = vec![
            "Update execution by cycle ID".to_string(),
            "Select test cycle".to_string(),
            "Search cycles by name".to_string(),
            "Back to main menu".to_string(),
        ];
        let result = match ui::pick("Choose an action", &items)? {
            Some(0) => update_by_cycle_id(api),
            Some(1) => select_cycle(api),
            Some(2) => search_cycles(api),
            _ => return Ok(()),
        };
        if let Err(e) = result {
            error!("Test cycle action failed: {:#}", e);
            ui::print_error(&format!("Error: {:#}", e));
            ui::pause();
        }
    }
}

/// Check a user supplied attachment path: it must exist, be a file and
/// carry one of `ALLOWED_EXTENSIONS`.
pub fn validate_attachment(raw: &str) -> Result<PathBuf, ValidationError> {
    let cleaned = ui::clean_path(raw);
    if cleaned.is_empty() {
        return Err(ValidationError::Empty);
    }
    let path = PathBuf::from(&cleaned);
    if !path.exists() {
        return Err(ValidationError::NotFound(cleaned));
    }
    if !path.is_file() {
        return Err(ValidationError::NotAFile(cleaned));
    }
    let ext = extension_of(&path);
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ValidationError::UnsupportedType(ext));
    }
    Ok(path)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[derive(Debug)]
pub enum AttachmentOutcome {
    NotRequested,
    Uploaded,
    Failed(ApiError),
}

/// What happened to one submitted update.
#[derive(Debug)]
pub struct ExecutionReport {
    pub execution_id: String,
    pub attachment: AttachmentOutcome,
}

/// Record the execution, then upload the attachment if there is one. An
/// upload failure does not undo the execution; it is reported alongside it.
pub fn submit<A: KualiteeApi + ?Sized>(
    api: &A,
    update: &TestCycleUpdate,
) -> Result<ExecutionReport, ApiError> {
    info!(
        "Executing tc {} in cycle {} as {}",
        update.tc_id, update.cycle_id, update.status
    );
    let execution_id = api.execute_test(update)?;
    let attachment = match &update.attachment {
        None => AttachmentOutcome::NotRequested,
        Some(path) => match api.upload_attachment(update, &execution_id, path) {
            Ok(()) => AttachmentOutcome::Uploaded,
            Err(e) => {
                error!("Attachment upload failed for {}: {}", path.display(), e);
                AttachmentOutcome::Failed(e)
            }
        },
    };
    Ok(ExecutionReport {
        execution_id,
        attachment,
    })
}

/// Messages for the user about a `submit` result.
pub fn describe(result: &Result<ExecutionReport, ApiError>) -> Vec<Notice> {
    match result {
        Err(e) => vec![Notice::Failure(format!("Test execution failed: {}", e))],
        Ok(report) => {
            let mut notes = vec![Notice::Success(format!(
                "Test executed successfully (execution ID {})",
                report.execution_id
            ))];
            match &report.attachment {
                AttachmentOutcome::NotRequested => {}
                AttachmentOutcome::Uploaded => {
                    notes.push(Notice::Success("Attachment uploaded successfully".into()))
                }
                AttachmentOutcome::Failed(e) => {
                    notes.push(Notice::Failure(format!("Attachment upload failed: {}", e)))
                }
            }
            notes
        }
    }
}

fn submit_and_report<A: KualiteeApi>(api: &A, update: &TestCycleUpdate, name: &str) {
    ui::print_info(&format!("\nExecuting test: {}...", name));
    let spinner = ui::spinner("Sending...");
    let result = submit(api, update);
    spinner.finish_and_clear();
    for notice in describe(&result) {
        notice.print();
    }
}

/// Core flow: cycle id -> test case -> status -> optional attachment.
fn update_by_cycle_id<A: KualiteeApi>(api: &A) -> Result<()> {
    let cycle_id: String = Input::new()
        .with_prompt("Cycle ID")
        .validate_with(|s: &String| -> Result<(), &'static str> {
            if s.trim().is_empty() {
                Err("Cycle ID must not be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    let cycle_id = cycle_id.trim().to_string();

    let cases = load_test_cases(api, &cycle_id)?;
    if cases.is_empty() {
        ui::print_warning("No test cases found in this cycle");
        ui::pause();
        return Ok(());
    }
    print_test_cases(&cases);

    let Some(test_case) = pick_test_case(&cases)? else {
        return Ok(());
    };
    let Some(status) = prompt_status()? else {
        return Ok(());
    };
    let mut update = TestCycleUpdate::new(&cycle_id, test_case, status);
    if let Some(path) = prompt_attachment(false)? {
        update = update.with_attachment(path);
    }

    submit_and_report(api, &update, &test_case.tc_name);
    ui::pause();
    Ok(())
}

fn select_cycle<A: KualiteeApi>(api: &A) -> Result<()> {
    let cycles = load_cycles(api)?;
    if cycles.is_empty() {
        ui::print_warning("No cycles found");
        ui::pause();
        return Ok(());
    }
    browse_cycles(api, &cycles, "Test Cycles")
}

fn search_cycles<A: KualiteeApi>(api: &A) -> Result<()> {
    let Some(term) = ui::prompt_optional("Enter cycle name to search (blank to cancel)")? else {
        return Ok(());
    };
    let cycles = load_cycles(api)?;
    let found = filter_cycles(&cycles, &term);
    if found.is_empty() {
        ui::print_warning(&format!("No cycles found matching '{}'", term));
        ui::pause();
        return Ok(());
    }
    browse_cycles(api, &found, &format!("Search Results for '{}'", term))
}

/// Case-insensitive substring match on the cycle name.
pub fn filter_cycles(cycles: &[Cycle], term: &str) -> Vec<Cycle> {
    let needle = term.to_lowercase();
    cycles
        .iter()
        .filter(|c| c.cycle_name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Same match for test case names within a cycle.
pub fn filter_test_cases<'a>(cases: &'a [TestCase], term: &str) -> Vec<&'a TestCase> {
    let needle = term.to_lowercase();
    cases
        .iter()
        .filter(|tc| tc.tc_name.to_lowercase().contains(&needle))
        .collect()
}

fn browse_cycles<A: KualiteeApi>(api: &A, cycles: &[Cycle], title: &str) -> Result<()> {
    loop {
        ui::header(None);
        let rows: Vec<Vec<String>> = cycles
            .iter()
            .enumerate()
            .map(|(i, c)| {
                vec![
                    (i + 1).to_string(),
                    c.id.clone(),
                    c.cycle_name.clone(),
                    c.status.clone(),
                ]
            })
            .collect();
        ui::print_table(Some(title), &["#", "Cycle ID", "Cycle Name", "Status"], &rows);
        ui::print_success(&format!("Total cycles: {}", cycles.len()));

        let items: Vec<String> = cycles
            .iter()
            .map(|c| format!("{} - {}", c.id, c.cycle_name))
            .collect();
        match ui::pick("Select cycle (Esc to go back)", &items)? {
            Some(idx) => cycle_view(api, &cycles[idx])?,
            None => return Ok(()),
        }
    }
}

fn cycle_view<A: KualiteeApi>(api: &A, cycle: &Cycle) -> Result<()> {
    loop {
        ui::header(Some(&format!("Cycle: {}  (ID {})", cycle.cycle_name, cycle.id)));
        let cases = load_test_cases(api, &cycle.id)?;
        if cases.is_empty() {
            ui::print_warning("No test cases found in this cycle");
            ui::pause();
            return Ok(());
        }
        print_test_cases(&cases);

        let items = vec![
            "Execute single test".to_string(),
            "Execute all tests (CSV file)".to_string(),
            "Search test by name".to_string(),
            "Back".to_string(),
        ];
        let result = match ui::pick("Cycle actions", &items)? {
            Some(0) => execute_single(api, &cycle.id, &cases),
            Some(1) => execute_from_csv(api, &cycle.id, &cases),
            Some(2) => search_tests(&cases),
            _ => return Ok(()),
        };
        if let Err(e) = result {
            error!("Cycle action failed: {:#}", e);
            ui::print_error(&format!("Error: {:#}", e));
            ui::pause();
        }
    }
}

/// Execute one test from the cycle view. Evidence is mandatory here.
fn execute_single<A: KualiteeApi>(api: &A, cycle_id: &str, cases: &[TestCase]) -> Result<()> {
    let Some(test_case) = pick_test_case(cases)? else {
        return Ok(());
    };
    let Some(status) = prompt_status()? else {
        return Ok(());
    };
    let Some(path) = prompt_attachment(true)? else {
        return Ok(());
    };
    let update = TestCycleUpdate::new(cycle_id, test_case, status).with_attachment(path);
    submit_and_report(api, &update, &test_case.tc_name);
    ui::pause();
    Ok(())
}

fn search_tests(cases: &[TestCase]) -> Result<()> {
    let Some(term) = ui::prompt_optional("Enter test name to search (blank to cancel)")? else {
        return Ok(());
    };
    let found = filter_test_cases(cases, &term);
    if found.is_empty() {
        ui::print_warning(&format!("No tests found matching '{}'", term));
    } else {
        let rows: Vec<Vec<String>> = found
            .iter()
            .enumerate()
            .map(|(i, tc)| {
                vec![
                    (i + 1).to_string(),
                    tc.testcase_id.clone(),
                    tc.tc_name.clone(),
                    tc.status.clone(),
                ]
            })
            .collect();
        ui::print_table(
            Some(&format!("Search Results for '{}'", term)),
            &["#", "Test ID", "Test Name", "Status"],
            &rows,
        );
        ui::print_success(&format!("Found {} test case(s)", found.len()));
    }
    ui::pause();
    Ok(())
}

/// One CSV line of a bulk execution file.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRow {
    pub test_case_name: String,
    pub status: String,
    pub attachment: String,
}

#[derive(Debug, Clone)]
pub struct PlannedExecution {
    pub name: String,
    pub update: TestCycleUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub name: String,
    pub reason: String,
    pub attachment: String,
}

#[derive(Debug, Default)]
pub struct ExecutionPlan {
    pub matched: Vec<PlannedExecution>,
    pub skipped: Vec<SkippedRow>,
}

/// Match CSV rows against the cycle's test cases by exact name and
/// validate status and attachment. Invalid rows are skipped with a reason.
pub fn plan_bulk_execution(cycle_id: &str, rows: &[ExecutionRow], cases: &[TestCase]) -> ExecutionPlan {
    let by_name: HashMap<&str, &TestCase> =
        cases.iter().map(|tc| (tc.tc_name.as_str(), tc)).collect();
    let mut plan = ExecutionPlan::default();

    for row in rows {
        let skip = |reason: String| SkippedRow {
            name: row.test_case_name.clone(),
            reason,
            attachment: row.attachment.clone(),
        };
        let status = match row.status.parse::<ExecutionStatus>() {
            Ok(s) => s,
            Err(e) => {
                plan.skipped.push(skip(e.to_string()));
                continue;
            }
        };
        let Some(test_case) = by_name.get(row.test_case_name.as_str()) else {
            plan.skipped.push(skip("Test case not found".into()));
            continue;
        };
        let path = match validate_attachment(&row.attachment) {
            Ok(p) => p,
            Err(e) => {
                plan.skipped.push(skip(e.to_string()));
                continue;
            }
        };
        plan.matched.push(PlannedExecution {
            name: row.test_case_name.clone(),
            update: TestCycleUpdate::new(cycle_id, test_case, status).with_attachment(path),
        });
    }
    plan
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkTally {
    pub succeeded: usize,
    pub failed: usize,
}

/// Run every planned execution in order. A row only counts as a success
/// when both the execution and its upload went through.
pub fn run_plan<A: KualiteeApi + ?Sized>(api: &A, plan: &ExecutionPlan) -> BulkTally {
    let mut tally = BulkTally::default();
    for item in &plan.matched {
        ui::print_info(&format!("Processing: {}...", item.name));
        let result = submit(api, &item.update);
        match &result {
            Ok(ExecutionReport {
                attachment: AttachmentOutcome::Uploaded,
                ..
            }) => {
                ui::print_success(&format!("  Executed & uploaded {}", item.name));
                tally.succeeded += 1;
            }
            Ok(ExecutionReport {
                attachment: AttachmentOutcome::NotRequested,
                ..
            }) => {
                ui::print_success(&format!("  Executed {}", item.name));
                tally.succeeded += 1;
            }
            Ok(ExecutionReport {
                attachment: AttachmentOutcome::Failed(e),
                ..
            }) => {
                ui::print_warning(&format!("  Executed but upload failed: {}", e));
                tally.failed += 1;
            }
            Err(e) => {
                error!("Error processing {}: {}", item.name, e);
                ui::print_error(&format!("  Execution failed: {}", e));
                tally.failed += 1;
            }
        }
    }
    tally
}

fn execute_from_csv<A: KualiteeApi>(api: &A, cycle_id: &str, cases: &[TestCase]) -> Result<()> {
    ui::print_warning(&format!("Allowed file types: {}", ALLOWED_EXTENSIONS.join(", ")));
    ui::print_table(
        Some("Required CSV Format"),
        CSV_COLUMNS,
        &[
            vec!["TC_Android_01".into(), "Passed".into(), "C:\\Screenshots\\test1.png".into()],
            vec!["TC_Android_02".into(), "Failed".into(), "C:\\Screenshots\\test2.jpg".into()],
        ],
    );
    println!("Use exact test case names from the list above.");

    let Some(raw) = ui::prompt_optional("Enter CSV file path (blank to cancel)")? else {
        return Ok(());
    };
    let rows: Vec<ExecutionRow> = csv_input::load_rows(Path::new(&ui::clean_path(&raw)), CSV_COLUMNS)?;
    let plan = plan_bulk_execution(cycle_id, &rows, cases);

    let mut preview: Vec<Vec<String>> = plan
        .matched
        .iter()
        .map(|m| {
            let file = m.update.attachment.as_deref();
            vec![
                m.name.clone(),
                format!("Will execute ({})", m.update.status),
                file.and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                file.and_then(|p| std::fs::metadata(p).ok())
                    .map(|md| format!("{:.1} KB", md.len() as f64 / 1024.0))
                    .unwrap_or_default(),
            ]
        })
        .collect();
    preview.extend(plan.skipped.iter().map(|s| {
        vec![
            s.name.clone(),
            format!("Skip: {}", s.reason),
            s.attachment.clone(),
            String::new(),
        ]
    }));
    ui::print_table(
        Some("Preview"),
        &["Test Case Name", "Status", "Attachment", "File Size"],
        &preview,
    );
    println!(
        "\n{} to execute, {} to skip",
        plan.matched.len(),
        plan.skipped.len()
    );

    if plan.matched.is_empty() {
        ui::print_warning("Nothing to execute");
        ui::pause();
        return Ok(());
    }
    if !Confirm::new()
        .with_prompt("Proceed with execution?")
        .default(false)
        .interact()?
    {
        ui::print_warning("Cancelled");
        ui::pause();
        return Ok(());
    }

    let tally = run_plan(api, &plan);
    info!(
        "Bulk execution in cycle {}: {} ok, {} failed, {} skipped",
        cycle_id,
        tally.succeeded,
        tally.failed,
        plan.skipped.len()
    );
    println!("\nSummary:");
    for line in ui::batch_totals(tally.succeeded, tally.failed, plan.skipped.len()) {
        line.print();
    }
    ui::pause();
    Ok(())
}

fn load_cycles<A: KualiteeApi>(api: &A) -> Result<Vec<Cycle>> {
    let spinner = ui::spinner("Fetching cycles...");
    let cycles = api.list_cycles();
    spinner.finish_and_clear();
    Ok(cycles?)
}

fn load_test_cases<A: KualiteeApi>(api: &A, cycle_id: &str) -> Result<Vec<TestCase>> {
    let spinner = ui::spinner("Loading test cases...");
    let cases = api.list_test_cases(cycle_id);
    spinner.finish_and_clear();
    Ok(cases?)
}

fn print_test_cases(cases: &[TestCase]) {
    let rows: Vec<Vec<String>> = cases
        .iter()
        .enumerate()
        .map(|(i, tc)| {
            let executed_by = if tc.executed_by.is_empty() {
                "-".to_string()
            } else {
                tc.executed_by.clone()
            };
            vec![
                (i + 1).to_string(),
                tc.testcase_id.clone(),
                tc.tc_name.clone(),
                tc.status.clone(),
                ui::ellipsize_middle(&tc.summary, 50),
                if tc.has_attachment() { "Yes" } else { "No" }.to_string(),
                executed_by,
            ]
        })
        .collect();
    ui::print_table(
        Some("Test Cases"),
        &["#", "Test ID", "Test Name", "Status", "Summary", "Attachment", "Executed By"],
        &rows,
    );
    ui::print_success(&format!("Total test cases: {}", cases.len()));
}

fn pick_test_case(cases: &[TestCase]) -> Result<Option<&TestCase>> {
    let items: Vec<String> = cases
        .iter()
        .map(|tc| format!("{} - {} [{}]", tc.testcase_id, tc.tc_name, tc.status))
        .collect();
    Ok(ui::pick("Select test (Esc to cancel)", &items)?.map(|idx| &cases[idx]))
}

/// `None` when the user backs out of the status list.
fn prompt_status() -> Result<Option<ExecutionStatus>> {
    let items: Vec<String> = ExecutionStatus::ALL
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();
    Ok(status_from_choice(ui::pick("Result status (Esc to cancel)", &items)?))
}

fn status_from_choice(choice: Option<usize>) -> Option<ExecutionStatus> {
    choice.and_then(|idx| ExecutionStatus::ALL.get(idx).copied())
}

/// Ask for an attachment path until it validates. When optional, blank
/// input means no attachment; when required, blank input cancels.
fn prompt_attachment(required: bool) -> Result<Option<PathBuf>> {
    ui::print_warning(&format!("Allowed file types: {}", ALLOWED_EXTENSIONS.join(", ")));
    let prompt = if required {
        "Attachment file path (blank to cancel)"
    } else {
        "Attachment file path (blank for none)"
    };
    loop {
        let Some(raw) = ui::prompt_optional(prompt)? else {
            return Ok(None);
        };
        match validate_attachment(&raw) {
            Ok(path) => return Ok(Some(path)),
            Err(e) => ui::print_error(&e.to_string()),
        }
    }
}
