use iced::widget::{button, container, text_input};
use iced::{Background, Border, Color, Shadow, Theme};

use crate::http::method::HttpMethod;
use crate::testing::TestStatus;

pub const BG: Color = Color {
    r: 18.0 / 255.0,
    g: 20.0 / 255.0,
    b: 24.0 / 255.0,
    a: 1.0,
};
pub const SURFACE_0: Color = Color {
    r: 23.0 / 255.0,
    g: 26.0 / 255.0,
    b: 31.0 / 255.0,
    a: 1.0,
};
pub const SURFACE_1: Color = Color {
    r: 30.0 / 255.0,
    g: 34.0 / 255.0,
    b: 41.0 / 255.0,
    a: 1.0,
};
pub const SURFACE_2: Color = Color {
    r: 39.0 / 255.0,
    g: 44.0 / 255.0,
    b: 53.0 / 255.0,
    a: 1.0,
};
pub const SURFACE_3: Color = Color {
    r: 51.0 / 255.0,
    g: 57.0 / 255.0,
    b: 68.0 / 255.0,
    a: 1.0,
};
pub const BORDER: Color = Color {
    r: 46.0 / 255.0,
    g: 52.0 / 255.0,
    b: 62.0 / 255.0,
    a: 1.0,
};
pub const TEXT: Color = Color {
    r: 228.0 / 255.0,
    g: 231.0 / 255.0,
    b: 236.0 / 255.0,
    a: 1.0,
};
pub const TEXT_MUTED: Color = Color {
    r: 138.0 / 255.0,
    g: 147.0 / 255.0,
    b: 162.0 / 255.0,
    a: 1.0,
};

pub const PRIMARY: Color = Color {
    r: 59.0 / 255.0,
    g: 201.0 / 255.0,
    b: 112.0 / 255.0,
    a: 1.0,
};
pub const PRIMARY_HOVER: Color = Color {
    r: 82.0 / 255.0,
    g: 214.0 / 255.0,
    b: 132.0 / 255.0,
    a: 1.0,
};
pub const DANGER: Color = Color {
    r: 235.0 / 255.0,
    g: 87.0 / 255.0,
    b: 87.0 / 255.0,
    a: 1.0,
};
pub const WARNING: Color = Color {
    r: 242.0 / 255.0,
    g: 196.0 / 255.0,
    b: 15.0 / 255.0,
    a: 1.0,
};
pub const ERROR: Color = Color {
    r: 208.0 / 255.0,
    g: 78.0 / 255.0,
    b: 160.0 / 255.0,
    a: 1.0,
};

pub fn method_color(method: HttpMethod) -> Color {
    match method {
        HttpMethod::Get => Color::from_rgb8(0x4f, 0x9d, 0xf7),
        HttpMethod::Post => Color::from_rgb8(0xf5, 0xa6, 0x23),
        HttpMethod::Put => Color::from_rgb8(0x9b, 0x7b, 0xf2),
        HttpMethod::Delete => DANGER,
    }
}

pub fn status_color(status: TestStatus) -> Color {
    match status {
        TestStatus::Pass => PRIMARY,
        TestStatus::Fail => DANGER,
        TestStatus::Error => ERROR,
        TestStatus::Skipped => WARNING,
    }
}

pub fn app_theme() -> Theme {
    Theme::custom(
        "LLM API Harness".to_string(),
        iced::theme::Palette {
            background: BG,
            text: TEXT,
            primary: PRIMARY,
            success: PRIMARY,
            danger: DANGER,
        },
    )
}

pub fn surface_style(color: Color, border_radius: f32) -> container::Style {
    flat_surface_style(color).border(Border {
        radius: border_radius.into(),
        width: 1.0,
        color: BORDER,
    })
}

pub fn flat_surface_style(color: Color) -> container::Style {
    container::Style::default()
        .background(Background::Color(color))
        .color(TEXT)
}

fn filled(background: Color, text_color: Color, border: Border) -> button::Style {
    button::Style {
        background: Some(Background::Color(background)),
        text_color,
        border,
        shadow: Shadow::default(),
    }
}

fn rounded(radius: f32, color: Color) -> Border {
    Border {
        radius: radius.into(),
        width: 1.0,
        color,
    }
}

pub fn section_tab_button(active: bool, _theme: &Theme, status: button::Status) -> button::Style {
    let background = match status {
        button::Status::Hovered => SURFACE_1,
        button::Status::Pressed => SURFACE_2,
        _ if active => SURFACE_1,
        _ => SURFACE_0,
    };
    let text_color = if active { TEXT } else { TEXT_MUTED };
    filled(background, text_color, Border::default())
}

pub fn primary_button(_theme: &Theme, status: button::Status) -> button::Style {
    match status {
        button::Status::Disabled => filled(SURFACE_3, TEXT_MUTED, rounded(8.0, SURFACE_3)),
        button::Status::Hovered => filled(PRIMARY_HOVER, BG, rounded(8.0, PRIMARY_HOVER)),
        _ => filled(PRIMARY, BG, rounded(8.0, PRIMARY)),
    }
}

pub fn subtle_button(_theme: &Theme, status: button::Status) -> button::Style {
    match status {
        button::Status::Disabled => filled(SURFACE_1, TEXT_MUTED, rounded(8.0, BORDER)),
        button::Status::Hovered | button::Status::Pressed => filled(SURFACE_3, TEXT, rounded(8.0, BORDER)),
        button::Status::Active => filled(SURFACE_2, TEXT, rounded(8.0, BORDER)),
    }
}

/// Row in the results list; the selected row is outlined.
pub fn list_item_button(active: bool, _theme: &Theme, status: button::Status) -> button::Style {
    let background = match status {
        button::Status::Hovered => SURFACE_2,
        button::Status::Pressed => SURFACE_3,
        _ if active => Color { a: 0.15, ..PRIMARY },
        _ => SURFACE_1,
    };
    let border = if active {
        rounded(6.0, PRIMARY)
    } else {
        Border {
            width: 0.0,
            ..rounded(6.0, BORDER)
        }
    };
    filled(background, if active { TEXT } else { TEXT_MUTED }, border)
}

pub fn input_style(_theme: &Theme, status: text_input::Status) -> text_input::Style {
    let border_color = match status {
        text_input::Status::Focused => PRIMARY,
        text_input::Status::Hovered => SURFACE_3,
        text_input::Status::Active | text_input::Status::Disabled => BORDER,
    };

    text_input::Style {
        background: Background::Color(SURFACE_1),
        border: rounded(8.0, border_color),
        icon: TEXT_MUTED,
        placeholder: TEXT_MUTED,
        value: if matches!(status, text_input::Status::Disabled) { TEXT_MUTED } else { TEXT },
        selection: Color { a: 0.35, ..PRIMARY },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_matches_its_8_bit_values() {
        assert_eq!(BG, Color::from_rgb8(18, 20, 24));
        assert_eq!(PRIMARY, Color::from_rgb8(59, 201, 112));
        assert_eq!(DANGER, Color::from_rgb8(235, 87, 87));
        assert_eq!(ERROR, Color::from_rgb8(208, 78, 160));
    }

    #[test]
    fn every_status_has_its_own_colour() {
        let colours = [TestStatus::Pass, TestStatus::Fail, TestStatus::Error, TestStatus::Skipped].map(status_color);
        for (i, a) in colours.iter().enumerate() {
            assert!(colours[i + 1..].iter().all(|b| a != b));
        }
    }
}
