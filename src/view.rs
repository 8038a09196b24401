use iced::widget::{
    button, column, container, rich_text, row, scrollable, span, text, text::Span, text_input,
    Column, Space,
};
use iced::{alignment, font, Border, Element, Font, Length, Theme};

use crate::conversation::{Bubble, ConversationState, CopyState, Phase};
use crate::markup::{Block, Fragment};
use crate::storage::ThemePreference;
use crate::transcript::Role;
use crate::Message;

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const BOLD: Font = Font {
    weight: font::Weight::Bold,
    ..Font::MONOSPACE
};

pub fn header<'a>(theme: ThemePreference, confirm_delete: bool) -> Element<'a, Message> {
    if confirm_delete {
        return row![
            text("Are you sure you want to delete all the chats?").size(14),
            Space::with_width(Length::Fill),
            button(text("Delete").size(14))
                .on_press(Message::DeleteConfirmed)
                .style(button::danger),
            button(text("Cancel").size(14))
                .on_press(Message::DeleteCancelled)
                .style(button::secondary),
        ]
        .spacing(8)
        .align_y(alignment::Vertical::Center)
        .into();
    }

    let theme_label = match theme {
        ThemePreference::Light => "[Dark mode]",
        ThemePreference::Dark => "[Light mode]",
    };

    row![
        text("Chat").size(20),
        Space::with_width(Length::Fill),
        button(text(theme_label).size(14))
            .on_press(Message::ToggleTheme)
            .style(button::text),
        button(text("[Delete all]").size(14))
            .on_press(Message::DeleteRequested)
            .style(button::text),
    ]
    .spacing(8)
    .align_y(alignment::Vertical::Center)
    .into()
}

/// Shown instead of the chat list while there is nothing to show.
pub fn greeting(suggestions: &[String]) -> Element<'_, Message> {
    let shortcuts = suggestions.iter().enumerate().fold(
        Column::new().spacing(8),
        |list, (index, suggestion)| {
            list.push(
                button(text(suggestion.as_str()).size(14))
                    .on_press(Message::Suggestion(index))
                    .padding(12)
                    .width(Length::Fill)
                    .style(button::secondary),
            )
        },
    );

    container(
        column![
            text("Hello there").size(32),
            text("How can I help you today?").size(18).style(text::secondary),
            shortcuts,
        ]
        .spacing(16)
        .max_width(560),
    )
    .width(Length::Fill)
    .height(Length::Fill)
    .align_x(alignment::Horizontal::Center)
    .align_y(alignment::Vertical::Center)
    .padding(15)
    .into()
}

pub fn chat_list(bubbles: &[Bubble], spinner_frame: usize, id: scrollable::Id) -> Element<'_, Message> {
    let list = bubbles
        .iter()
        .fold(Column::new().spacing(12).padding(15), |list, item| {
            list.push(bubble(item, spinner_frame))
        });

    scrollable(list)
        .id(id)
        .on_scroll(Message::Scrolled)
        .height(Length::Fill)
        .into()
}

pub fn input_row<'a>(value: &str, id: text_input::Id, state: ConversationState) -> Element<'a, Message> {
    let (placeholder, can_send) = match state {
        ConversationState::Idle | ConversationState::Error => ("Enter a prompt here", true),
        ConversationState::AwaitingResponse => ("Waiting for a reply...", false),
        ConversationState::TypingOut => ("Replying...", false),
    };
    let input = text_input(placeholder, value)
        .on_input(Message::InputChanged)
        .on_submit(Message::Submit)
        .padding(15)
        .size(16)
        .id(id);

    row![
        input,
        button(text("Send").size(16))
            .on_press_maybe(can_send.then_some(Message::Submit))
            .padding(15),
    ]
    .spacing(8)
    .align_y(alignment::Vertical::Center)
    .into()
}

fn bubble(item: &Bubble, spinner_frame: usize) -> Element<'_, Message> {
    let body: Element<'_, Message> = match item.phase {
        Phase::Loading => text(format!(
            "{} Thinking...",
            SPINNER_FRAMES[spinner_frame % SPINNER_FRAMES.len()]
        ))
        .size(15)
        .into(),
        Phase::Errored => text(item.text.as_str()).size(15).style(text::danger).into(),
        Phase::Typing | Phase::Settled => fragment(&item.fragment),
    };

    match item.role {
        Role::User => row![
            Space::with_width(Length::Fill),
            container(body)
                .padding(12)
                .max_width(520)
                .style(outgoing_style),
        ]
        .into(),
        Role::Assistant => {
            let errored = item.phase == Phase::Errored;
            let mut content = column![container(body)
                .padding(12)
                .max_width(620)
                .style(move |theme: &Theme| incoming_style(theme, errored))]
            .spacing(4);

            if item.can_copy() {
                let label = match item.copy {
                    CopyState::Ready => "[Copy]",
                    CopyState::Copied => "[Copied]",
                };
                content = content.push(
                    button(text(label).size(13))
                        .on_press(Message::Copy(item.id))
                        .padding(4)
                        .style(button::text),
                );
            }

            content.into()
        }
    }
}

fn fragment(body: &Fragment) -> Element<'_, Message> {
    body.blocks
        .iter()
        .fold(Column::new().spacing(10), |blocks, block| {
            blocks.push(match block {
                Block::Text(spans) => {
                    let spans: Vec<Span<'_, Message>> = spans
                        .iter()
                        .map(|s| span(s.text.as_str()).font(if s.strong { BOLD } else { Font::MONOSPACE }))
                        .collect();
                    Element::from(rich_text(spans).size(15))
                }
                Block::Code { language, code } => column![
                    text(language.as_str()).size(12).style(text::secondary),
                    container(text(code.as_str()).size(14).font(Font::MONOSPACE))
                        .padding(10)
                        .width(Length::Fill)
                        .style(code_style),
                ]
                .spacing(4)
                .into(),
            })
        })
        .into()
}

fn outgoing_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(palette.primary.weak.color.into()),
        text_color: Some(palette.primary.weak.text),
        border: Border {
            radius: 14.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}

fn incoming_style(theme: &Theme, errored: bool) -> container::Style {
    let palette = theme.extended_palette();
    let border_color = if errored {
        palette.danger.base.color
    } else {
        palette.background.strong.color
    };
    container::Style {
        background: Some(palette.background.weak.color.into()),
        text_color: Some(palette.background.weak.text),
        border: Border {
            color: border_color,
            width: 1.0,
            radius: 14.0.into(),
        },
        ..container::Style::default()
    }
}

fn code_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style {
        background: Some(palette.background.strong.color.into()),
        text_color: Some(palette.background.strong.text),
        border: Border {
            radius: 6.0.into(),
            ..Border::default()
        },
        ..container::Style::default()
    }
}
