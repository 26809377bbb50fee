use iced::alignment::Alignment;
use iced::widget::{container, horizontal_space, row, text};
use iced::{Element, Length};

use crate::report::Report;

use super::{Message, style};

pub fn view<'a>(running: bool, report: Option<&Report>) -> Element<'a, Message> {
    let status = if running {
        text("Running…").size(12).color(style::WARNING)
    } else if let Some(report) = report {
        let summary = &report.summary;
        let color = if report.exit_code() == 0 { style::PRIMARY } else { style::DANGER };
        text(format!(
            "{} passed · {} failed · {} errors · {} skipped",
            summary.passed, summary.failed, summary.errors, summary.skipped
        ))
        .size(12)
        .color(color)
    } else {
        text("No runs yet").size(12).color(style::TEXT_MUTED)
    };

    container(
        row![
            text("LLM API Harness").size(16),
            text(format!("v{}", env!("CARGO_PKG_VERSION"))).size(10).color(style::TEXT_MUTED),
            horizontal_space(),
            status
        ]
        .spacing(8)
        .padding([8, 12])
        .align_y(Alignment::Center),
    )
    .width(Length::Fill)
    .style(|_| style::surface_style(style::SURFACE_1, 0.0))
    .into()
}
