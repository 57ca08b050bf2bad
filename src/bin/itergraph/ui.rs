//! Text rendering for ledger histories, snapshots, intervals and verify
//! reports.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use itergraph::admin::{VerifyReport, VerifySeverity};
use itergraph::history::Snapshot;
use itergraph::{DependentRecord, EntityRecord};
use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

#[derive(Clone, Copy)]
enum Role {
    Title,
    Info,
    Latest,
    Window,
    Note,
    Error,
    Warning,
    Clean,
}

impl Theme {
    fn style(self, role: Role) -> Style {
        let light = self == Theme::Light;
        match role {
            Role::Title => Style::new()
                .bold()
                .fg(if light { Color::Blue } else { Color::Purple }),
            Role::Info => Style::new().fg(Color::Cyan),
            Role::Latest => Style::new().bold().fg(Color::Green),
            Role::Window => Style::new().fg(if light { Color::DarkGray } else { Color::LightBlue }),
            Role::Note => Style::new().italic(),
            Role::Error => Style::new().bold().fg(Color::Red),
            Role::Warning => Style::new().fg(Color::Yellow),
            Role::Clean => Style::new().fg(Color::Green),
        }
    }
}

pub struct Ui {
    theme: Theme,
    color: bool,
}

impl Ui {
    pub fn new(theme: Theme) -> Self {
        let color = theme != Theme::Plain && std::io::stdout().is_terminal();
        Self { theme, color }
    }

    fn paint(&self, role: Role, text: &str) -> String {
        if self.color {
            self.theme.style(role).paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn title(&self, text: &str) {
        println!("{}", self.paint(Role::Title, text));
    }

    pub fn tables(&self, entities: &[String], relations: &[String]) {
        self.title("Entity tables");
        for table in entities {
            println!("  {table}");
        }
        self.title("Relation tables");
        for table in relations {
            println!("  {table}");
        }
    }

    /// One line per stored iteration, oldest first.
    pub fn history(&self, title: &str, rows: &[EntityRecord]) {
        self.title(title);
        for row in rows {
            println!("  {}", self.iteration_line(row));
        }
    }

    pub fn dependents(&self, title: &str, rows: &[DependentRecord]) {
        self.title(title);
        if rows.is_empty() {
            println!("  (none)");
        }
        for row in rows {
            println!("  {}", self.dependent_line(row));
        }
    }

    pub fn snapshot(&self, snapshot: &Snapshot) {
        let entity = &snapshot.entity;
        let status = if entity.latest { "current" } else { "archived" };
        self.title(&format!(
            "'{}' at iteration {} ({status})",
            entity.id, entity.iteration
        ));
        println!("  {}", self.iteration_line(entity));
        for (relation, rows) in &snapshot.dependents {
            self.dependents(&format!("{relation} in effect"), rows);
        }
    }

    pub fn verify_report(&self, report: &VerifyReport, elapsed: Duration) {
        let counts = &report.counts;
        self.title(&format!("Verify ({:?})", report.level));
        println!(
            "  {} entities over {} rows, {} dependents over {} intervals ({} open)",
            counts.entities,
            counts.entity_rows,
            counts.dependents,
            counts.intervals,
            counts.open_intervals
        );
        for finding in &report.findings {
            let role = match finding.severity {
                VerifySeverity::Error => Role::Error,
                VerifySeverity::Warning => Role::Warning,
                VerifySeverity::Info => Role::Info,
            };
            let tag = self.paint(role, &format!("{:?}", finding.severity).to_lowercase());
            println!("  {tag} {}: {}", finding.table, finding.message);
        }
        if report.truncated {
            println!("  ... further findings omitted");
        }
        let verdict = if report.success {
            self.paint(Role::Clean, "consistent")
        } else {
            self.paint(Role::Error, "inconsistent")
        };
        println!("{verdict} after {} ms", elapsed.as_millis());
    }

    /// Spinner on stderr while a long read runs; silent off a terminal.
    pub fn spinner(&self, label: &str) -> Spinner {
        let bar = self.color.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                bar.set_style(style);
            }
            bar.set_message(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        Spinner {
            bar,
            start: Instant::now(),
        }
    }

    fn iteration_line(&self, row: &EntityRecord) -> String {
        let mut line = format!("#{}", row.iteration);
        if row.latest {
            line.push(' ');
            line.push_str(&self.paint(Role::Latest, "(latest)"));
        }
        if let Some(label) = row.display.label() {
            line.push_str(&format!(" {label}"));
        }
        if let Some(state) = row.display.state.as_deref() {
            line.push_str(&format!(" [{state}]"));
        }
        if let Some(note) = row.update_note.as_deref() {
            line.push_str(&format!(": {}", self.paint(Role::Note, note)));
        }
        line
    }

    fn dependent_line(&self, row: &DependentRecord) -> String {
        let window = if row.is_open() {
            format!("[{}, open]", row.first_iteration)
        } else {
            format!("[{}, {}]", row.first_iteration, row.last_iteration)
        };
        let window = self.paint(Role::Window, &window);
        match &row.other {
            Some(other) => match row.other_display.label() {
                Some(label) => format!("{} -> {other} '{label}' {window}", row.id),
                None => format!("{} -> {other} {window}", row.id),
            },
            None if row.attrs.is_null() => format!("{} {window}", row.id),
            None => format!("{} {window} {}", row.id, row.attrs),
        }
    }
}

pub struct Spinner {
    bar: Option<ProgressBar>,
    start: Instant,
}

impl Spinner {
    /// Clears the spinner and returns how long it ran.
    pub fn stop(self) -> Duration {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
        self.start.elapsed()
    }
}
