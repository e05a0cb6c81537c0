//! Terminal drop target.
//!
//! Dragging a file onto a terminal window makes the terminal paste the
//! file's path. With bracketed paste enabled that arrives as a single
//! [`Event::Paste`], which is exactly a drop event: the payload is parsed
//! with [`parse_drop_payload`], each path is validated with [`acquire`], and
//! each valid request is spawned as its own task running
//! [`convert_request`]. Outcomes come back over a channel and update the job
//! list. Terminals without bracketed paste deliver the path as keystrokes;
//! those are buffered and submitted on Enter.
//!
//! [`DropZone`] holds all UI state and has no terminal dependency, so the
//! event handling is unit-tested without a TTY.

use crate::config::ConversionConfig;
use crate::convert::convert_request;
use crate::error::Ocr2MdError;
use crate::output::ConversionOutput;
use crate::pipeline::input::{acquire, parse_drop_payload, ConversionRequest};
use crossterm::event::{
    DisableBracketedPaste, EnableBracketedPaste, Event, EventStream, KeyCode, KeyEvent,
    KeyEventKind, KeyModifiers,
};
use futures::StreamExt;
use ratatui::layout::{Alignment, Constraint, Layout};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, List, ListItem, Paragraph};
use ratatui::{DefaultTerminal, Frame};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// State of one dropped file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done { output: PathBuf, pages: usize },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DropJob {
    pub id: u64,
    pub source: PathBuf,
    pub status: JobStatus,
}

/// A finished conversion reported back to the UI.
#[derive(Debug)]
pub struct JobOutcome {
    pub id: u64,
    pub result: Result<ConversionOutput, Ocr2MdError>,
}

/// UI state for the drop target.
#[derive(Debug, Default)]
pub struct DropZone {
    jobs: Vec<DropJob>,
    input: String,
    next_id: u64,
    notice: Option<String>,
    quit: bool,
    /// Set by a quit key while conversions are still running.
    quit_pending: bool,
}

impl DropZone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[DropJob] {
        &self.jobs
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Most recent one-line notification.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Number of conversions still in flight.
    pub fn running(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count()
    }

    /// Treat `payload` as a drop. Returns the requests to start; paths that
    /// fail validation are recorded as failed jobs immediately.
    pub fn handle_payload(
        &mut self,
        payload: &str,
        output_dir: Option<&Path>,
    ) -> Vec<(u64, ConversionRequest)> {
        let paths = parse_drop_payload(payload);
        if paths.is_empty() {
            self.notice = Some("Nothing to convert in dropped text".to_string());
            return Vec::new();
        }

        let mut started = Vec::new();
        for path in paths {
            let id = self.next_id;
            self.next_id += 1;
            match acquire(&path, output_dir) {
                Ok(request) => {
                    self.notice = Some(format!("Converting {}", display_name(&path)));
                    self.jobs.push(DropJob {
                        id,
                        source: path,
                        status: JobStatus::Running,
                    });
                    started.push((id, request));
                }
                Err(e) => {
                    self.notice = Some(format!("Rejected {}", display_name(&path)));
                    self.jobs.push(DropJob {
                        id,
                        source: path,
                        status: JobStatus::Failed(e.to_string()),
                    });
                }
            }
        }
        started
    }

    /// Record a finished conversion.
    pub fn apply(&mut self, outcome: JobOutcome) {
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == outcome.id) else {
            return;
        };
        let name = display_name(&job.source);
        match outcome.result {
            Ok(out) => {
                self.notice = Some(format!(
                    "✓ {} → {}",
                    name,
                    out.request.output_path().display()
                ));
                job.status = JobStatus::Done {
                    output: out.request.output_path().to_path_buf(),
                    pages: out.stats.page_count,
                };
            }
            Err(e) => {
                self.notice = Some(format!("✗ {name} failed"));
                job.status = JobStatus::Failed(e.to_string());
            }
        }
    }

    /// Handle a key press. Returns typed text when Enter submits it.
    ///
    /// `q`/`Esc` with conversions in flight only warns; a second press
    /// quits and abandons them. `Ctrl-C` always quits.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<String> {
        let quit_key = matches!(key.code, KeyCode::Esc)
            || (key.code == KeyCode::Char('q') && self.input.is_empty());
        if !quit_key {
            self.quit_pending = false;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.quit = true;
            }
            _ if quit_key => self.request_quit(),
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                let text = std::mem::take(&mut self.input);
                if !text.trim().is_empty() {
                    return Some(text);
                }
            }
            _ => {}
        }
        None
    }
}

impl DropZone {
    fn request_quit(&mut self) {
        let running = self.running();
        if running == 0 || self.quit_pending {
            self.quit = true;
        } else {
            self.quit_pending = true;
            self.notice = Some(format!(
                "{running} conversion(s) still running; press q again to abandon them"
            ));
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── Terminal loop ────────────────────────────────────────────────────────

/// Create the drop output directory so every dropped file lands inside it
/// as `<stem>.md` instead of all of them being written to one path.
pub async fn prepare_output_dir(output_dir: Option<&Path>) -> std::io::Result<()> {
    if let Some(dir) = output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// Run the drop target until the user quits.
///
/// Every drop is converted with a clone of `config`; Markdown files go to
/// `output_dir` when given, otherwise beside each PDF.
pub async fn run(config: ConversionConfig, output_dir: Option<PathBuf>) -> std::io::Result<()> {
    prepare_output_dir(output_dir.as_deref()).await?;

    let mut terminal = ratatui::init();
    crossterm::execute!(std::io::stdout(), EnableBracketedPaste)?;

    let result = event_loop(&mut terminal, &config, output_dir.as_deref()).await;

    let _ = crossterm::execute!(std::io::stdout(), DisableBracketedPaste);
    ratatui::restore();
    result
}

async fn event_loop(
    terminal: &mut DefaultTerminal,
    config: &ConversionConfig,
    output_dir: Option<&Path>,
) -> std::io::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<JobOutcome>();
    let mut events = EventStream::new();
    let mut zone = DropZone::new();

    while !zone.should_quit() {
        terminal.draw(|frame| render(&zone, frame))?;

        let submitted = tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Paste(text))) => Some(text),
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => zone.handle_key(key),
                Some(Ok(_)) => None,
                Some(Err(e)) => return Err(e),
                None => break,
            },
            Some(outcome) = rx.recv() => {
                zone.apply(outcome);
                None
            }
        };

        if let Some(payload) = submitted {
            for (id, request) in zone.handle_payload(&payload, output_dir) {
                let config = config.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = convert_request(&request, &config).await;
                    let _ = tx.send(JobOutcome { id, result });
                });
            }
        }
    }
    Ok(())
}

fn render(zone: &DropZone, frame: &mut Frame) {
    let [drop_area, jobs_area, status_area] = Layout::vertical([
        Constraint::Length(7),
        Constraint::Min(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let drop_text = vec![
        Line::from(""),
        Line::from("Drop PDF files here".bold()),
        Line::from("(or type a path and press Enter)".dim()),
        Line::from(vec![Span::raw("> "), Span::raw(zone.input()).fg(Color::Cyan)]),
    ];
    frame.render_widget(
        Paragraph::new(drop_text)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" ocr2md ").border_style(Style::new().fg(Color::Cyan))),
        drop_area,
    );

    let items: Vec<ListItem> = zone
        .jobs()
        .iter()
        .rev()
        .map(|job| {
            let name = display_name(&job.source);
            let line = match &job.status {
                JobStatus::Running => Line::from(vec![
                    Span::styled("… ", Style::new().fg(Color::Yellow)),
                    Span::raw(name),
                    Span::raw("  converting").dim(),
                ]),
                JobStatus::Done { output, pages } => Line::from(vec![
                    Span::styled("✓ ", Style::new().fg(Color::Green)),
                    Span::raw(name),
                    Span::raw(format!("  → {}  ({pages} pages)", output.display())).dim(),
                ]),
                JobStatus::Failed(err) => Line::from(vec![
                    Span::styled("✗ ", Style::new().fg(Color::Red)),
                    Span::raw(name),
                    Span::styled(format!("  {err}"), Style::new().fg(Color::Red)),
                ]),
            };
            ListItem::new(line)
        })
        .collect();
    frame.render_widget(
        List::new(items).block(Block::bordered().title(format!(
            " conversions ({} running) ",
            zone.running()
        ))),
        jobs_area,
    );

    let status = zone.notice().unwrap_or("q / Esc to quit");
    frame.render_widget(
        Paragraph::new(status).style(Style::new().add_modifier(Modifier::DIM)),
        status_area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ConversionStats;
    use tempfile::TempDir;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn pdf(dir: &TempDir, name: &str) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, b"%PDF-1.7\n").unwrap();
        p
    }

    #[test]
    fn drop_of_valid_pdf_starts_job() {
        let dir = TempDir::new().unwrap();
        let p = pdf(&dir, "report.pdf");
        let mut zone = DropZone::new();

        let started = zone.handle_payload(&format!("'{}'", p.display()), None);

        assert_eq!(started.len(), 1);
        assert_eq!(started[0].1.output_path(), dir.path().join("report.md").as_path());
        assert_eq!(zone.running(), 1);
    }

    #[test]
    fn drop_of_invalid_file_is_reported_not_started() {
        let dir = TempDir::new().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, b"hello").unwrap();
        let mut zone = DropZone::new();

        let started = zone.handle_payload(&txt.display().to_string(), None);

        assert!(started.is_empty());
        assert!(matches!(zone.jobs()[0].status, JobStatus::Failed(ref e) if e.contains(".pdf")));
        assert!(zone.notice().unwrap().starts_with("Rejected"));
    }

    #[test]
    fn each_dropped_file_is_independent() {
        let dir = TempDir::new().unwrap();
        let a = pdf(&dir, "a.pdf");
        let b = pdf(&dir, "b.pdf");
        let mut zone = DropZone::new();

        let started = zone.handle_payload(&format!("{}\n{}", a.display(), b.display()), None);
        assert_eq!(started.len(), 2);
        let (id_a, req_a) = started[0].clone();
        let (id_b, _) = started[1].clone();

        zone.apply(JobOutcome {
            id: id_b,
            result: Err(Ocr2MdError::OcrService {
                status: Some(500),
                message: "boom".into(),
            }),
        });
        zone.apply(JobOutcome {
            id: id_a,
            result: Ok(ConversionOutput {
                request: req_a,
                markdown: "x".into(),
                pages: Vec::new(),
                images: Vec::new(),
                stats: ConversionStats {
                    page_count: 2,
                    ..Default::default()
                },
            }),
        });

        assert_eq!(zone.running(), 0);
        assert_eq!(
            zone.jobs()[0].status,
            JobStatus::Done {
                output: dir.path().join("a.md"),
                pages: 2
            }
        );
        assert!(matches!(zone.jobs()[1].status, JobStatus::Failed(ref e) if e.contains("HTTP 500")));
    }

    #[test]
    fn typed_path_is_submitted_on_enter() {
        let mut zone = DropZone::new();
        for c in "/tmp/x.pdf".chars() {
            assert!(zone.handle_key(key(KeyCode::Char(c))).is_none());
        }
        zone.handle_key(key(KeyCode::Backspace));
        assert_eq!(zone.input(), "/tmp/x.pd");
        assert_eq!(zone.handle_key(key(KeyCode::Enter)).as_deref(), Some("/tmp/x.pd"));
        assert_eq!(zone.input(), "");
        assert!(zone.handle_key(key(KeyCode::Enter)).is_none());
    }

    #[tokio::test]
    async fn drops_into_missing_output_dir_get_distinct_files() {
        let dir = TempDir::new().unwrap();
        let a = pdf(&dir, "a.pdf");
        let b = pdf(&dir, "b.pdf");
        let out = dir.path().join("converted");
        prepare_output_dir(Some(&out)).await.unwrap();
        let mut zone = DropZone::new();

        let payload = format!("{}\n{}", a.display(), b.display());
        let started = zone.handle_payload(&payload, Some(&out));

        assert!(out.is_dir());
        let outputs: Vec<_> = started
            .iter()
            .map(|(_, r)| r.output_path().to_path_buf())
            .collect();
        assert_eq!(outputs, vec![out.join("a.md"), out.join("b.md")]);
    }

    #[test]
    fn quit_with_running_jobs_needs_second_press() {
        let dir = TempDir::new().unwrap();
        let p = pdf(&dir, "report.pdf");
        let mut zone = DropZone::new();
        zone.handle_payload(&p.display().to_string(), None);
        assert_eq!(zone.running(), 1);

        zone.handle_key(key(KeyCode::Char('q')));
        assert!(!zone.should_quit());
        assert!(zone.notice().unwrap().contains("1 conversion(s) still running"));

        // Any other key cancels the pending quit.
        zone.handle_key(key(KeyCode::Char('x')));
        zone.handle_key(key(KeyCode::Backspace));
        zone.handle_key(key(KeyCode::Esc));
        assert!(!zone.should_quit());
        zone.handle_key(key(KeyCode::Esc));
        assert!(zone.should_quit());
    }

    #[test]
    fn quit_keys() {
        let mut zone = DropZone::new();
        zone.handle_key(key(KeyCode::Char('/')));
        zone.handle_key(key(KeyCode::Char('q')));
        assert!(!zone.should_quit(), "q inside a typed path must not quit");

        let mut zone = DropZone::new();
        zone.handle_key(key(KeyCode::Char('q')));
        assert!(zone.should_quit());

        let mut zone = DropZone::new();
        zone.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(zone.should_quit());
    }

    #[test]
    fn empty_drop_sets_notice() {
        let mut zone = DropZone::new();
        assert!(zone.handle_payload("   ", None).is_empty());
        assert!(zone.jobs().is_empty());
        assert!(zone.notice().is_some());
    }
}
