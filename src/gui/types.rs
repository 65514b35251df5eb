use iced::{Event};

use crate::config::types::Config;
use crate::device::types::{DeviceEvent};
use crate::form::FormField;
use crate::inference::prediction::PredictionView;
use crate::inference::types::Gender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Form,
    Monitor,
}

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    ConfigLoadComplete((Config, Option<String>)),
    ConfigSaveComplete(Option<String>), // error message if the save failed
    NoticeConfirmed,
    DeviceEvent(DeviceEvent),
    FormGenderChange(Gender),
    FormChange(FormField, String),
    SubmitForm,
    StartScan,
    Disconnect,
    RunPrediction,
    PredictionComplete(PredictionView),
}
