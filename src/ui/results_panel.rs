use iced::alignment::{Alignment, Horizontal};
use iced::widget::{button, column, container, horizontal_space, row, scrollable, text};
use iced::{Background, Border, Color, Element, Length};

use crate::http::method::HttpMethod;
use crate::report::Report;
use crate::testing::{TestResult, TestStatus};

use super::{Message, StatusFilter, style};

pub fn view<'a>(
    report: Option<&'a Report>,
    filter: StatusFilter,
    selected: Option<usize>,
    running: bool,
) -> Element<'a, Message> {
    let tabs = row(StatusFilter::ALL.map(|option| Element::from(filter_button(option, filter))))
        .spacing(0)
        .height(36);

    let Some(report) = report else {
        let hint = if running { "Waiting for results…" } else { "Run the suite to see results" };
        let empty = column![text(hint).size(14).color(style::TEXT_MUTED)]
            .width(Length::Fill)
            .align_x(Horizontal::Center);
        return column![tabs, container(empty).padding(16).height(Length::Fill)].into();
    };

    let mut list = column![].spacing(2);
    for (index, result) in report.results.iter().enumerate() {
        if filter.matches(result.status) {
            list = list.push(result_row(index, result, selected == Some(index)));
        }
    }

    let detail = match selected.and_then(|index| report.results.get(index)) {
        Some(result) => detail_view(result),
        None => container(text("Select a result").size(12).color(style::TEXT_MUTED))
            .padding(16)
            .into(),
    };

    let mut section = column![tabs].spacing(0).height(Length::Fill);
    if !report.cleanup_failures.is_empty() {
        section = section.push(
            container(
                text(format!(
                    "{} test resources could not be deleted",
                    report.cleanup_failures.len()
                ))
                .size(12)
                .color(style::DANGER),
            )
            .padding([6, 10]),
        );
    }

    section
        .push(
            row![
                scrollable(container(list).padding(8))
                    .width(Length::FillPortion(55))
                    .height(Length::Fill),
                container(detail)
                    .width(Length::FillPortion(45))
                    .height(Length::Fill)
                    .style(|_| style::surface_style(style::SURFACE_1, 0.0)),
            ]
            .height(Length::Fill),
        )
        .into()
}

fn filter_button<'a>(option: StatusFilter, active: StatusFilter) -> iced::widget::Button<'a, Message> {
    button(text(option.label()).size(12))
        .on_press(Message::FilterSelected(option))
        .width(Length::Fill)
        .padding([8, 10])
        .style(move |theme, status| style::section_tab_button(option == active, theme, status))
}

fn result_row(index: usize, result: &TestResult, active: bool) -> Element<'_, Message> {
    let method = result.endpoint.split_whitespace().next().and_then(|word| word.parse().ok());

    button(
        row![
            status_badge(result.status),
            method_badge(method),
            text(&result.test_id).size(12),
            horizontal_space(),
            text(format!("{:.0} ms", result.latency_ms)).size(11).color(style::TEXT_MUTED),
        ]
        .spacing(6)
        .align_y(Alignment::Center),
    )
    .on_press(Message::ResultSelected(index))
    .width(Length::Fill)
    .padding([5, 8])
    .style(move |theme, status| style::list_item_button(active, theme, status))
    .into()
}

fn detail_view(result: &TestResult) -> Element<'_, Message> {
    let mut details = column![
        text(&result.test_id).size(14),
        text(&result.endpoint).size(12).color(style::TEXT_MUTED),
        text(format!("{} · {:.1} ms", result.path, result.latency_ms))
            .size(11)
            .color(style::TEXT_MUTED),
    ]
    .spacing(6);

    if let Some(message) = &result.message {
        details = details.push(text(message).size(12).color(style::status_color(result.status)));
    }
    for violation in &result.violations {
        let location = if violation.path.is_empty() {
            String::new()
        } else {
            format!("{}: ", violation.path)
        };
        details = details.push(
            text(format!("• {location}{}", violation.message))
                .size(12)
                .color(style::DANGER),
        );
    }
    if let Some(response) = &result.response {
        let truncated = if response.truncated { " (truncated)" } else { "" };
        details = details
            .push(text(format!("Response {}{truncated}", response.status)).size(12))
            .push(
                container(text(pretty_json_body(&response.body)).size(12))
                    .padding(10)
                    .width(Length::Fill)
                    .style(|_| style::surface_style(style::SURFACE_2, 8.0)),
            );
    }

    scrollable(container(details).padding(12)).height(Length::Fill).into()
}

fn status_badge<'a>(status: TestStatus) -> Element<'a, Message> {
    badge(status.to_string().to_uppercase(), style::status_color(status), 56)
}

fn method_badge<'a>(method: Option<HttpMethod>) -> Element<'a, Message> {
    match method {
        Some(method) => {
            let label = match method {
                HttpMethod::Delete => "DEL",
                other => other.as_str(),
            };
            badge(label.to_string(), style::method_color(method), 38)
        }
        None => container(text("")).width(38).into(),
    }
}

fn badge<'a>(label: String, color: Color, width: u16) -> Element<'a, Message> {
    container(text(label).size(10).color(color))
        .padding([2, 4])
        .width(width)
        .align_x(Horizontal::Center)
        .style(move |_| {
            iced::widget::container::Style::default()
                .background(Background::Color(Color { a: 0.12, ..color }))
                .border(Border {
                    radius: 3.0.into(),
                    width: 0.0,
                    color: Color::TRANSPARENT,
                })
        })
        .into()
}

fn pretty_json_body(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}
