use std::path::PathBuf;
use std::sync::Arc;
use iced::{Alignment, Application, Color, Command, Element, Length, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::executor;
use iced::time::{every as iced_time_every};
use iced::theme::{self, Theme};
use iced::widget::{
    Column, PickList, button, column, container, horizontal_rule, row, text, text_input,
};
use log::{error, info, warn};
use tokio_util::sync::{CancellationToken};

use crate::CliArgs;
use crate::config::io::{ConfigIO};
use crate::config::types::Config;
use crate::device::connection::{SessionOptions, session_subscription};
use crate::device::constants::TARGET;
use crate::device::types::{DeviceEvent, SessionCommand, SessionEvent, SessionHandle, SessionState, VitalsReading};
use crate::error::{AppRunError, FormError, InferenceError};
use crate::form::{FormField, PatientForm};
use crate::gui::style::{CardStyleSheet, STATUS_LINKED, STATUS_UNLINKED};
use crate::gui::types::{Message, Screen};
use crate::inference::classifier::{Classifier, UnavailableClassifier, load_classifier};
use crate::inference::prediction::{PredictionView, Tone, run_prediction};
use crate::inference::types::{FeatureVector, Gender, PatientData};
use crate::notify::BannerNotifier;

const TITLE: &str = concat!("Vitals Monitor ", env!("CARGO_PKG_VERSION"));

pub struct ApplicationFlags {
    config_io: ConfigIO,
    model_override: Option<PathBuf>,
}

pub struct MyApplication {
    // this token is cancelled upon exit
    app_cancel: CancellationToken,

    // messages that the user must click away
    notices: Vec<String>,

    config_io: ConfigIO,
    config: Config,
    // the session subscription is started once the scan timeout is known
    config_loaded: bool,
    model_override: Option<PathBuf>,
    classifier: Arc<dyn Classifier>,

    screen: Screen,
    form: PatientForm,
    form_error: Option<FormError>,
    patient: Option<PatientData>,

    // latest state from the session
    session: Option<SessionHandle>,
    session_state: SessionState,
    status_message: String,
    scanning: bool,
    latest_reading: Option<VitalsReading>,
    prediction: PredictionView,
    notifier: BannerNotifier,
    // the last notification, shown above the readings
    banner: Option<String>,
}

fn load_model(path: Option<PathBuf>) -> Result<Arc<dyn Classifier>, InferenceError> {
    let classifier = load_classifier(path.as_deref())?;
    info!("Loaded classifier model from {}", path.unwrap_or_default().to_string_lossy());
    Ok(Arc::new(classifier))
}

fn status_color(state: SessionState) -> Color {
    match state {
        SessionState::DiscoveringServices
        | SessionState::DiscoveringCharacteristics
        | SessionState::Subscribed => STATUS_LINKED,
        _ => STATUS_UNLINKED,
    }
}

// a linked session has to be disconnected first
fn can_start_scan(scanning: bool, state: SessionState) -> bool {
    !scanning && state.accepts_scan()
}

impl MyApplication {
    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }

    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    let mut error_message: Option<String> = None;

                    if err.is_file_not_found_error() {
                        // this is probably the first start of the app
                        info!("Config file not found, using defaults");
                    } else {
                        error!("Failed to load config: {:?}", &err);
                        error_message = Some(format!("Failed to load config: {}", &err));
                    }
                    (Config::default(), error_message)
                }
            }
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn save_config(&self) -> Command<Message> {
        let config = self.config.clone();
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.save(config).await {
                Ok(_) => None,
                Err(err) => {
                    error!("Failed to save config: {:?}", &err);
                    Some(format!("Failed to save config: {}", &err))
                },
            }
        };

        Command::perform(fut, Message::ConfigSaveComplete)
    }

    fn request(&mut self, command: SessionCommand) {
        match &mut self.session {
            Some(handle) => {
                if let Err(err) = handle.request(command) {
                    warn!("Failed to send {:?} to the session: {}", command, err);
                }
            },
            None => warn!("Session is not ready yet, ignoring {:?}", command),
        }
    }

    fn predict(&self) -> Command<Message> {
        let Some(patient) = self.patient else {
            return Command::none();
        };

        let classifier = self.classifier.clone();
        let features = FeatureVector::new(&patient, self.latest_reading);
        let notifier = self.notifier.clone();

        let fut = async move {
            run_prediction(classifier.as_ref(), &features, &notifier)
        };

        Command::perform(fut, Message::PredictionComplete)
    }

    fn session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::StatusChanged(message) => self.status_message = message,
            SessionEvent::ScanningChanged(scanning) => self.scanning = scanning,
            SessionEvent::StateChanged(state) => self.session_state = state,
            SessionEvent::VitalsUpdated(reading) => self.latest_reading = Some(reading),
        }
    }

    fn view_form(&self) -> Element<Message> {
        let field_input = |field: FormField| -> Element<Message> {
            row![
                text(field.label()).width(180),
                text_input(field.placeholder(), self.form.value(field))
                    .width(200)
                    .on_input(move |value| Message::FormChange(field, value)),
            ]
            .align_items(Alignment::Center)
            .spacing(10)
            .into()
        };

        let error_text = match &self.form_error {
            Some(err) => text(err.to_string()).style(STATUS_UNLINKED),
            None => text(""),
        };

        column![
            text("Enter Initial Patient Vitals").size(24),

            row![
                text("Gender:").width(180),
                PickList::new(
                    Gender::ALL,
                    Some(self.form.gender),
                    Message::FormGenderChange,
                ).width(200),
            ].align_items(Alignment::Center).spacing(10),

            Column::with_children(FormField::ALL.into_iter().map(field_input))
                .spacing(10),

            error_text,

            button(text("Submit Data"))
                .style(theme::Button::Positive)
                .on_press(Message::SubmitForm),
        ]
        .align_items(Alignment::Center)
        .spacing(20)
        .into()
    }

    fn view_monitor(&self) -> Element<Message> {
        let card = |content: Element<'static, Message>, tone: Tone| -> Element<'static, Message> {
            container(content)
                .width(Length::Fill)
                .padding(15)
                .style(theme::Container::Custom(Box::new(CardStyleSheet { tone })))
                .into()
        };

        let (temperature, heart_rate) = match self.latest_reading {
            Some(reading) => (
                format!("Temperature: {:.1} °C", reading.temperature),
                format!("Heart Rate: {:.0} BPM", reading.heart_rate),
            ),
            None => ("Temperature: -- °C".to_string(), "Heart Rate: -- BPM".to_string()),
        };

        let mut prediction = column![text(self.prediction.headline.clone()).size(20)].spacing(5);
        if let Some(details) = &self.prediction.details {
            prediction = prediction.push(text(details.clone()).size(14));
        }

        let mut scan_button = button(text(if self.scanning { "Scanning..." } else { "Start Scan" }));
        if can_start_scan(self.scanning, self.session_state) {
            scan_button = scan_button.on_press(Message::StartScan);
        }

        let mut disconnect_button = button(text("Disconnect")).style(theme::Button::Destructive);
        if self.session_state.is_linked() {
            disconnect_button = disconnect_button.on_press(Message::Disconnect);
        }

        let banner = match &self.banner {
            Some(message) => card(text(message.clone()).size(16).into(), self.prediction.tone),
            None => column![].into(),
        };

        column![
            text(format!("Status: {}", self.status_message)).style(status_color(self.session_state)),

            horizontal_rule(10),

            banner,

            card(text(temperature).size(20).into(), Tone::Neutral),
            card(text(heart_rate).size(20).into(), Tone::Neutral),
            card(prediction.into(), self.prediction.tone),

            row![
                scan_button,
                disconnect_button,
                button(text("Test"))
                    .style(theme::Button::Secondary)
                    .on_press(Message::RunPrediction),
            ].spacing(20),
        ]
        .align_items(Alignment::Center)
        .spacing(20)
        .into()
    }
}

impl Application for MyApplication {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (MyApplication, Command<Self::Message>) {
        let app = MyApplication {
            app_cancel: CancellationToken::new(),
            notices: Vec::new(),
            config_io: flags.config_io,
            config: Config::default(),
            config_loaded: false,
            model_override: flags.model_override,
            classifier: Arc::new(UnavailableClassifier::new(InferenceError::AssetLoad {
                detail: "Model is still loading".to_string(),
            })),
            screen: Screen::Form,
            form: PatientForm::default(),
            form_error: None,
            patient: None,
            session: None,
            session_state: SessionState::Idle,
            status_message: format!("Waiting for {}...", TARGET.device_name),
            scanning: false,
            latest_reading: None,
            prediction: PredictionView::not_run(),
            notifier: BannerNotifier::default(),
            banner: None,
        };

        let command = app.load_config();
        (app, command)
    }

    fn title(&self) -> String {
        String::from(TITLE)
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                if let Some(patient) = &config.patient {
                    self.form = PatientForm::from_patient(patient);
                }

                let model_path = self.model_override.clone().or_else(|| config.model_path.clone());
                self.classifier = match load_model(model_path) {
                    Ok(classifier) => classifier,
                    Err(err) => {
                        error!("Failed to load classifier model: {}", err);
                        self.notices.push(format!("{}. Predictions will fail until a model is configured.", err));
                        Arc::new(UnavailableClassifier::new(err))
                    },
                };

                self.config = config;
                self.config_loaded = true;
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }
            },
            Message::ConfigSaveComplete(error_message) => {
                if let Some(error_message) = error_message {
                    self.notices.push(error_message);
                }
            },
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                }
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();
                return window::close(id);
            },
            Message::EventOccurred(_) => {},
            Message::DeviceEvent(DeviceEvent::Ready(handle)) => {
                info!("BLE session ready");
                self.session = Some(handle);
            },
            Message::DeviceEvent(DeviceEvent::Session(event)) => self.session_event(event),

            Message::FormGenderChange(gender) => {
                self.form.gender = gender;
            },
            Message::FormChange(field, value) => {
                self.form.set_value(field, value);
            },
            Message::SubmitForm => {
                match self.form.validate() {
                    Ok(patient) => {
                        info!("Patient data submitted");
                        self.form_error = None;
                        self.patient = Some(patient);
                        self.screen = Screen::Monitor;
                        self.config.patient = Some(patient);
                        return self.save_config();
                    },
                    Err(err) => {
                        info!("Patient form rejected: {}", err);
                        self.form_error = Some(err);
                    },
                }
            },

            Message::StartScan => self.request(SessionCommand::StartScan),
            Message::Disconnect => self.request(SessionCommand::Disconnect),
            Message::RunPrediction => return self.predict(),
            Message::PredictionComplete(view) => {
                self.prediction = view;
                if let Some(message) = self.notifier.take() {
                    self.banner = Some(message);
                }
            },
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![event::listen().map(Message::EventOccurred)];

        if self.config_loaded {
            let options = SessionOptions { scan_timeout: self.config.scan_timeout() };
            subscriptions.push(
                session_subscription(options, self.app_cancel.clone()).map(Message::DeviceEvent)
            );
        }

        if self.screen == Screen::Monitor {
            subscriptions.push(
                iced_time_every(self.config.prediction_interval()).map(|_| Message::RunPrediction)
            );
        }

        Subscription::batch(subscriptions)
    }

    fn view(&self) -> Element<Message> {
        if let Some(notice) = self.notices.first() {
            return container(
                column![
                    text(notice),

                    button(text("Okay"))
                        .on_press(Message::NoticeConfirmed),

                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        let content = match self.screen {
            Screen::Form => self.view_form(),
            Screen::Monitor => self.view_monitor(),
        };

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(20)
            .center_x()
            .into()
    }
}

pub fn run_application(args: CliArgs) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(args.config)?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io, model_override: args.model };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("vitals-monitor".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(520.0, 720.0);

    // this function will call process::exit() unless there was a startup error
    MyApplication::run(settings)?;
    Ok(())
}
