//! # Dashboard
//!
//! An iced front end over the same executor the `test` command drives. It
//! keeps the last report on screen and lists recent runs from the history.

pub mod header;
pub mod results_panel;
pub mod sidebar;
pub mod style;

use std::collections::BTreeSet;
use std::sync::Arc;

use iced::widget::{column, container, row};
use iced::{Element, Length, Subscription, Task, window};
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::history::{self, RunRecord};
use crate::report::Report;
use crate::runner::Executor;
use crate::storage;
use crate::testing::{Module, TestStatus};

const HISTORY_LIMIT: usize = 20;

pub fn run(settings: Settings) -> iced::Result {
    iced::application("LLM API Harness", update, view)
        .theme(|_| style::app_theme())
        .window_size((1220.0, 840.0))
        .subscription(subscription)
        .exit_on_close_request(false)
        .run_with(move || (Dashboard::new(settings), Task::none()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Problems,
    Skipped,
    Passed,
}

impl StatusFilter {
    pub const ALL: [StatusFilter; 4] = [
        StatusFilter::All,
        StatusFilter::Problems,
        StatusFilter::Skipped,
        StatusFilter::Passed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatusFilter::All => "All",
            StatusFilter::Problems => "Failures",
            StatusFilter::Skipped => "Skipped",
            StatusFilter::Passed => "Passed",
        }
    }

    pub fn matches(self, status: TestStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Problems => matches!(status, TestStatus::Fail | TestStatus::Error),
            StatusFilter::Skipped => status == TestStatus::Skipped,
            StatusFilter::Passed => status == TestStatus::Pass,
        }
    }
}

pub struct Dashboard {
    settings: Settings,
    modules: BTreeSet<Module>,
    base_url: String,
    token: String,
    parallel: bool,
    generate_data: bool,
    running: bool,
    cancel: Option<broadcast::Sender<()>>,
    /// The window was closed mid-run; exit once teardown has finished.
    exit_pending: bool,
    report: Option<Arc<Report>>,
    selected: Option<usize>,
    filter: StatusFilter,
    history: Vec<RunRecord>,
    error: Option<String>,
}

impl Dashboard {
    fn new(settings: Settings) -> Self {
        let mut error = None;
        let history = history::load_recent(&settings.report_dir, HISTORY_LIMIT).unwrap_or_else(|err| {
            error = Some(err);
            Vec::new()
        });
        let report = match storage::load_latest(&settings.report_dir) {
            Ok(report) => report.map(Arc::new),
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring unreadable latest results");
                None
            }
        };

        Self {
            modules: Module::CONCRETE.into_iter().collect(),
            base_url: settings.base_url.clone(),
            token: settings.token.clone().unwrap_or_default(),
            parallel: settings.parallel,
            generate_data: settings.generate_data && !settings.no_generate_data,
            settings,
            running: false,
            cancel: None,
            exit_pending: false,
            report,
            selected: None,
            filter: StatusFilter::All,
            history,
            error,
        }
    }

    /// The launch settings with the sidebar's edits applied.
    fn run_settings(&self) -> Settings {
        let mut settings = self.settings.clone();
        settings.base_url = self.base_url.trim().to_string();
        settings.token = Some(self.token.clone()).filter(|token| !token.trim().is_empty());
        settings.parallel = self.parallel;
        settings.generate_data = self.generate_data;
        settings.no_generate_data = false;
        settings
    }

    fn selected_modules(&self) -> Vec<Module> {
        self.modules.iter().copied().collect()
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    ModuleToggled(Module, bool),
    BaseUrlChanged(String),
    TokenChanged(String),
    ParallelToggled(bool),
    GenerateDataToggled(bool),
    RunPressed,
    CancelPressed,
    RunFinished(Result<Arc<Report>, String>),
    ResultSelected(usize),
    FilterSelected(StatusFilter),
    CloseRequested(window::Id),
}

fn subscription(_dashboard: &Dashboard) -> Subscription<Message> {
    window::close_requests().map(Message::CloseRequested)
}

fn update(dashboard: &mut Dashboard, message: Message) -> Task<Message> {
    match message {
        Message::ModuleToggled(module, checked) => {
            if checked {
                dashboard.modules.insert(module);
            } else {
                dashboard.modules.remove(&module);
            }
            Task::none()
        }
        Message::BaseUrlChanged(value) => {
            dashboard.base_url = value;
            Task::none()
        }
        Message::TokenChanged(value) => {
            dashboard.token = value;
            Task::none()
        }
        Message::ParallelToggled(value) => {
            dashboard.parallel = value;
            Task::none()
        }
        Message::GenerateDataToggled(value) => {
            dashboard.generate_data = value;
            Task::none()
        }
        Message::RunPressed => {
            if dashboard.running {
                return Task::none();
            }

            let executor = match dashboard
                .run_settings()
                .resolve(&dashboard.selected_modules())
                .and_then(Executor::new)
            {
                Ok(executor) => executor,
                Err(err) => {
                    dashboard.error = Some(err.to_string());
                    return Task::none();
                }
            };

            let (cancel_tx, cancel_rx) = broadcast::channel(1);
            dashboard.cancel = Some(cancel_tx);
            dashboard.running = true;
            dashboard.error = None;
            dashboard.selected = None;

            Task::perform(
                async move {
                    let report = executor.run(cancel_rx).await.map_err(|err| err.to_string())?;
                    storage::persist(&report, executor.config());
                    Ok::<_, String>(Arc::new(report))
                },
                Message::RunFinished,
            )
        }
        Message::CancelPressed => {
            if let Some(cancel) = dashboard.cancel.take() {
                tracing::info!("Cancelling run from the dashboard");
                let _ = cancel.send(());
            }
            Task::none()
        }
        Message::RunFinished(result) => {
            dashboard.running = false;
            dashboard.cancel = None;
            if dashboard.exit_pending {
                if let Err(err) = result {
                    tracing::error!(error = %err, "Run failed while closing");
                }
                return iced::exit();
            }
            match result {
                Ok(report) => {
                    dashboard.report = Some(report);
                    match history::load_recent(&dashboard.settings.report_dir, HISTORY_LIMIT) {
                        Ok(history) => dashboard.history = history,
                        Err(err) => tracing::warn!(error = %err, "Failed to reload run history"),
                    }
                }
                Err(err) => dashboard.error = Some(err),
            }
            Task::none()
        }
        Message::ResultSelected(index) => {
            dashboard.selected = Some(index);
            Task::none()
        }
        Message::FilterSelected(filter) => {
            dashboard.filter = filter;
            Task::none()
        }
        Message::CloseRequested(_) => {
            if !dashboard.running {
                return iced::exit();
            }
            tracing::info!("Window closed during a run, cancelling and waiting for teardown");
            dashboard.exit_pending = true;
            if let Some(cancel) = dashboard.cancel.take() {
                let _ = cancel.send(());
            }
            Task::none()
        }
    }
}

fn view(dashboard: &Dashboard) -> Element<'_, Message> {
    let header = header::view(dashboard.running, dashboard.report.as_deref());

    let sidebar = container(sidebar::view(dashboard))
        .width(280)
        .height(Length::Fill);

    let results = container(results_panel::view(
        dashboard.report.as_deref(),
        dashboard.filter,
        dashboard.selected,
        dashboard.running,
    ))
    .width(Length::Fill)
    .height(Length::Fill)
    .style(|_| style::surface_style(style::SURFACE_0, 0.0));

    let layout = column![header, row![sidebar, results].height(Length::Fill)]
        .spacing(1)
        .height(Length::Fill)
        .width(Length::Fill);

    container(layout)
        .width(Length::Fill)
        .height(Length::Fill)
        .style(|_| style::flat_surface_style(style::BG))
        .into()
}
