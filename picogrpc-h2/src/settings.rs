//! Local connection settings advertised in the initial SETTINGS frame.

use crate::frame::{
    setting_id, Setting, DEFAULT_HEADER_TABLE_SIZE, DEFAULT_INITIAL_WINDOW_SIZE,
    DEFAULT_MAX_FRAME_SIZE,
};

/// Builder-style settings for the client side of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub header_table_size: u32,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            max_concurrent_streams: 100,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ConnectionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header_table_size(mut self, size: u32) -> Self {
        self.header_table_size = size;
        self
    }

    pub fn max_concurrent_streams(mut self, count: u32) -> Self {
        self.max_concurrent_streams = count;
        self
    }

    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.initial_window_size = size;
        self
    }

    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Settings payload for the initial SETTINGS frame. Push is always
    /// disabled; this engine is client-only.
    pub fn to_settings(&self) -> Vec<Setting> {
        vec![
            Setting {
                id: setting_id::HEADER_TABLE_SIZE,
                value: self.header_table_size,
            },
            Setting {
                id: setting_id::ENABLE_PUSH,
                value: 0,
            },
            Setting {
                id: setting_id::MAX_CONCURRENT_STREAMS,
                value: self.max_concurrent_streams,
            },
            Setting {
                id: setting_id::INITIAL_WINDOW_SIZE,
                value: self.initial_window_size,
            },
            Setting {
                id: setting_id::MAX_FRAME_SIZE,
                value: self.max_frame_size,
            },
        ]
    }
}
