mod completion;
mod config;
mod conversation;
mod markup;
mod storage;
mod transcript;
mod typing;
mod view;

use iced::{
    widget::{column, scrollable, text_input},
    Element, Task, Theme, Font, Size, Subscription,
    time, clipboard,
    keyboard::{self, Key},
    event::{self, Event as IcedEvent},
    window,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use completion::{ApiError, CompletionClient};
use conversation::{Controller, Phase, Progress, Settings, Submission, TurnId};
use storage::{Persistence, ThemePreference};

const SPINNER_INTERVAL: Duration = Duration::from_millis(80);

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::load();

    iced::application("Chat Bar", App::update, App::view)
        .theme(App::theme)
        .subscription(App::subscription)
        .window(window::Settings {
            size: Size::new(config.window.width as f32, config.window.height as f32),
            min_size: Some(Size::new(
                config.window.min_width as f32,
                config.window.min_height as f32,
            )),
            position: window::Position::Centered,
            ..Default::default()
        })
        .default_font(Font::MONOSPACE)
        .run_with(move || App::new(config))
}

#[derive(Debug, Clone)]
pub enum Message {
    InputChanged(String),
    Submit,
    Suggestion(usize),
    ShowLoading(TurnId),
    ResponseReceived(TurnId, Result<String, ApiError>),
    TypeTick,
    SpinnerTick,
    Scrolled(scrollable::Viewport),
    ToggleTheme,
    DeleteRequested,
    DeleteConfirmed,
    DeleteCancelled,
    Copy(TurnId),
    CopyReset(TurnId),
    Exit,
}

struct App {
    controller: Controller,
    client: CompletionClient,
    input_text: String,
    suggestions: Vec<String>,
    copy_confirm: Duration,
    confirm_delete: bool,
    spinner_frame: usize,
    input_id: text_input::Id,
    chat_id: scrollable::Id,
}

impl App {
    fn new(config: config::Config) -> (Self, Task<Message>) {
        let controller = Controller::new(Persistence::open_default(), Settings::from_config(&config));
        let client = CompletionClient::from_config(&config.api);

        tracing::info!(
            model = client.model(),
            restored = controller.bubbles().len(),
            "chat ready"
        );

        let input_id = text_input::Id::unique();
        let chat_id = scrollable::Id::unique();

        let app = App {
            controller,
            client,
            input_text: String::new(),
            suggestions: config.chat.suggestions.clone(),
            copy_confirm: config.chat.copy_confirm(),
            confirm_delete: false,
            spinner_frame: 0,
            input_id: input_id.clone(),
            chat_id: chat_id.clone(),
        };

        let focus_task = text_input::focus(input_id);
        let scroll_task = scrollable::snap_to(chat_id, scrollable::RelativeOffset::END);

        (app, Task::batch([focus_task, scroll_task]))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::InputChanged(value) => {
                self.input_text = value;
                Task::none()
            }
            Message::Submit => match self.controller.submit(&self.input_text) {
                Some(submission) => {
                    self.input_text.clear();
                    self.start_turn(submission)
                }
                None => Task::none(),
            },
            Message::Suggestion(index) => {
                let Some(prompt) = self.suggestions.get(index).cloned() else {
                    return Task::none();
                };
                match self.controller.suggest(&prompt) {
                    Some(submission) => self.start_turn(submission),
                    None => Task::none(),
                }
            }
            Message::ShowLoading(turn) => {
                let Some(request) = self.controller.show_loading(turn) else {
                    return Task::none();
                };
                let client = self.client.clone();

                let request_task = Task::perform(
                    async move { client.complete(&request).await },
                    move |result| Message::ResponseReceived(turn, result),
                );
                Task::batch([request_task, self.follow()])
            }
            Message::ResponseReceived(turn, result) => {
                match self.controller.receive(turn, result) {
                    Progress::Ignored => Task::none(),
                    _ => self.follow(),
                }
            }
            Message::TypeTick => match self.controller.tick() {
                Progress::Typing | Progress::Settled => self.follow(),
                Progress::Failed | Progress::Ignored => Task::none(),
            },
            Message::SpinnerTick => {
                self.spinner_frame = self.spinner_frame.wrapping_add(1);
                Task::none()
            }
            Message::Scrolled(viewport) => {
                self.controller.update_scroll(viewport.relative_offset().y);
                Task::none()
            }
            Message::ToggleTheme => {
                let theme = self.controller.toggle_theme();
                tracing::debug!(?theme, "theme toggled");
                Task::none()
            }
            Message::DeleteRequested => {
                self.confirm_delete = true;
                Task::none()
            }
            Message::DeleteConfirmed => {
                self.confirm_delete = false;
                self.controller.delete_all();
                Task::none()
            }
            Message::DeleteCancelled => {
                self.confirm_delete = false;
                Task::none()
            }
            Message::Copy(turn) => {
                let Some(text) = self.controller.copy(turn) else {
                    return Task::none();
                };
                let reset = Task::perform(tokio::time::sleep(self.copy_confirm), move |_| {
                    Message::CopyReset(turn)
                });
                Task::batch([clipboard::write(text), reset])
            }
            Message::CopyReset(turn) => {
                self.controller.reset_copy(turn);
                Task::none()
            }
            Message::Exit => iced::exit(),
        }
    }

    /// Schedules the loading placeholder after the pacing delay and jumps to
    /// the new message.
    fn start_turn(&self, submission: Submission) -> Task<Message> {
        let Submission { turn, delay } = submission;
        let loading = Task::perform(tokio::time::sleep(delay), move |_| Message::ShowLoading(turn));
        Task::batch([loading, self.follow()])
    }

    /// Scrolls to the newest content unless the user has scrolled away.
    fn follow(&self) -> Task<Message> {
        if self.controller.should_autoscroll() {
            scrollable::snap_to(self.chat_id.clone(), scrollable::RelativeOffset::END)
        } else {
            Task::none()
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        let typing = match self.controller.typing_interval() {
            Some(interval) => time::every(interval).map(|_| Message::TypeTick),
            None => Subscription::none(),
        };

        let loading = self
            .controller
            .bubbles()
            .iter()
            .any(|bubble| bubble.phase == Phase::Loading);
        let spinner = if loading {
            time::every(SPINNER_INTERVAL).map(|_| Message::SpinnerTick)
        } else {
            Subscription::none()
        };

        let events = event::listen_with(|event, _status, _id| {
            if let IcedEvent::Keyboard(keyboard::Event::KeyPressed {
                key: Key::Named(keyboard::key::Named::Escape),
                ..
            }) = event
            {
                Some(Message::Exit)
            } else {
                None
            }
        });

        Subscription::batch([typing, spinner, events])
    }

    fn view(&self) -> Element<Message> {
        let header = view::header(self.controller.theme(), self.confirm_delete);

        let body = if self.controller.is_empty() {
            view::greeting(&self.suggestions)
        } else {
            view::chat_list(self.controller.bubbles(), self.spinner_frame, self.chat_id.clone())
        };

        let input = view::input_row(
            &self.input_text,
            self.input_id.clone(),
            self.controller.state(),
        );

        column![header, body, input]
            .spacing(10)
            .padding(10)
            .into()
    }

    fn theme(&self) -> Theme {
        match self.controller.theme() {
            ThemePreference::Light => Theme::TokyoNightLight,
            ThemePreference::Dark => Theme::TokyoNight,
        }
    }
}
