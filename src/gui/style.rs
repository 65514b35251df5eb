use iced::{Border, Color, Shadow, Theme};
use iced::widget::container::{StyleSheet, Appearance};

use crate::inference::prediction::Tone;

pub const STATUS_LINKED: Color = Color::from_rgb(0.13, 0.55, 0.13);
pub const STATUS_UNLINKED: Color = Color::from_rgb(0.75, 0.1, 0.1);

fn tone_colors(tone: Tone) -> (Color, Color) {
    // (background, text)
    match tone {
        Tone::Neutral => (Color::from_rgb(0.92, 0.92, 0.92), Color::BLACK),
        Tone::Safe => (Color::from_rgb(0.83, 0.94, 0.83), Color::from_rgb(0.08, 0.4, 0.08)),
        Tone::Warning => (Color::from_rgb(1.0, 0.9, 0.7), Color::from_rgb(0.6, 0.3, 0.0)),
        Tone::Error => (Color::from_rgb(0.98, 0.82, 0.82), Color::from_rgb(0.6, 0.05, 0.05)),
    }
}

/** Card background for readings and the prediction result */
pub struct CardStyleSheet {
    pub tone: Tone,
}

impl StyleSheet for CardStyleSheet {
    type Style = Theme;

    fn appearance(&self, _style: &Self::Style) -> Appearance {
        let (background, text_color) = tone_colors(self.tone);

        Appearance {
            text_color: Some(text_color),
            background: Some(background.into()),
            border: Border {
                color: Color::TRANSPARENT,
                width: 0.0,
                radius: 6.0.into(),
            },
            shadow: Shadow::default(),
        }
    }
}
