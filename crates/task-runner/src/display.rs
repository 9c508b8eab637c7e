pub trait DisplayTarget {
    fn alert(&mut self, message: &str);
    fn show_error(&mut self, message: &str);
    fn replace_document(&mut self, html: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayEvent {
    Alert(String),
    Error(String),
    Replaced(String),
}

#[derive(Debug, Default)]
pub struct RecordingDisplay {
    events: Vec<DisplayEvent>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[DisplayEvent] {
        &self.events
    }

    pub fn alerts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DisplayEvent::Alert(m) => Some(m.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DisplayEvent::Error(m) => Some(m.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn document(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            DisplayEvent::Replaced(html) => Some(html.as_str()),
            _ => None,
        })
    }
}

impl DisplayTarget for RecordingDisplay {
    fn alert(&mut self, message: &str) {
        self.events.push(DisplayEvent::Alert(message.to_string()));
    }

    fn show_error(&mut self, message: &str) {
        self.events.push(DisplayEvent::Error(message.to_string()));
    }

    fn replace_document(&mut self, html: &str) {
        self.events.push(DisplayEvent::Replaced(html.to_string()));
    }
}
