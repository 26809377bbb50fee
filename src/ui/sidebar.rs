use chrono::{DateTime, Utc};
use iced::alignment::Alignment;
use iced::widget::{button, checkbox, column, container, horizontal_rule, row, scrollable, text, text_input};
use iced::{Element, Length};

use crate::history::RunRecord;
use crate::testing::Module;

use super::{Dashboard, Message, style};

pub fn view(dashboard: &Dashboard) -> Element<'_, Message> {
    let target = column![
        text("Target").size(11).color(style::TEXT_MUTED),
        text_input("http://localhost:8000", &dashboard.base_url)
            .on_input(Message::BaseUrlChanged)
            .padding([6, 8])
            .size(12)
            .style(style::input_style),
        text_input("Bearer token", &dashboard.token)
            .on_input(Message::TokenChanged)
            .secure(true)
            .padding([6, 8])
            .size(12)
            .style(style::input_style),
        checkbox("Parallel execution", dashboard.parallel)
            .on_toggle(Message::ParallelToggled)
            .size(14)
            .text_size(12),
        checkbox("Generate test data", dashboard.generate_data)
            .on_toggle(Message::GenerateDataToggled)
            .size(14)
            .text_size(12),
    ]
    .spacing(6);

    let mut modules = column![text("Modules").size(11).color(style::TEXT_MUTED)].spacing(4);
    for module in Module::CONCRETE {
        modules = modules.push(
            checkbox(module.as_str(), dashboard.modules.contains(&module))
                .on_toggle(move |checked| Message::ModuleToggled(module, checked))
                .size(14)
                .text_size(12),
        );
    }

    let action = if dashboard.running {
        button(text("Cancel").size(13))
            .on_press_maybe(dashboard.cancel.is_some().then_some(Message::CancelPressed))
            .width(Length::Fill)
            .padding([8, 12])
            .style(style::subtle_button)
    } else {
        button(text("Run tests").size(13))
            .on_press_maybe((!dashboard.modules.is_empty()).then_some(Message::RunPressed))
            .width(Length::Fill)
            .padding([8, 12])
            .style(style::primary_button)
    };

    let mut controls = column![target, modules, action].spacing(14);
    if let Some(err) = &dashboard.error {
        controls = controls.push(text(err).size(11).color(style::DANGER));
    }

    container(
        column![
            container(controls).padding([10, 10]),
            horizontal_rule(1).style(|_| iced::widget::rule::Style {
                color: style::BORDER,
                width: 1,
                radius: 0.0.into(),
                fill_mode: iced::widget::rule::FillMode::Full,
            }),
            container(history_view(&dashboard.history)).padding([8, 10]).height(Length::Fill),
        ]
        .spacing(0),
    )
    .height(Length::Fill)
    .style(|_| style::surface_style(style::SURFACE_0, 0.0))
    .into()
}

fn history_view(history: &[RunRecord]) -> Element<'_, Message> {
    let mut list = column![text("Recent runs").size(11).color(style::TEXT_MUTED)].spacing(6);

    if history.is_empty() {
        list = list.push(text("No runs recorded").size(12).color(style::TEXT_MUTED));
    }
    for run in history {
        let color = if run.cancelled {
            style::WARNING
        } else if run.failed + run.errors > 0 {
            style::DANGER
        } else {
            style::PRIMARY
        };
        list = list.push(
            container(
                row![
                    container(text("").size(2))
                        .width(4)
                        .height(28)
                        .style(move |_| style::surface_style(color, 2.0)),
                    column![
                        text(format!("{}/{} passed", run.passed, run.total)).size(12),
                        text(relative_time(&run.started_at)).size(10).color(style::TEXT_MUTED),
                    ]
                    .spacing(2),
                ]
                .spacing(8)
                .align_y(Alignment::Center),
            )
            .padding([4, 6])
            .width(Length::Fill),
        );
    }

    scrollable(list.spacing(4)).height(Length::Fill).into()
}

fn relative_time(started_at: &str) -> String {
    let Ok(started) = DateTime::parse_from_rfc3339(started_at) else {
        return started_at.to_string();
    };
    let diff = (Utc::now() - started.with_timezone(&Utc)).num_seconds().max(0);

    if diff < 60 {
        format!("{diff}s ago")
    } else if diff < 3600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86400 {
        format!("{}h ago", diff / 3600)
    } else {
        format!("{}d ago", diff / 86400)
    }
}
