use crate::category::Color;

pub const COLORS: [Color; 12] = [
    Color::rgb(0, 176, 80),
    Color::rgb(128, 255, 0),
    Color::rgb(255, 255, 0),
    Color::rgb(255, 204, 0),
    Color::rgb(255, 153, 0),
    Color::rgb(255, 51, 0),
    Color::rgb(255, 0, 0),
    Color::rgb(153, 0, 255),
    Color::rgb(102, 51, 255),
    Color::rgb(0, 0, 255),
    Color::rgb(0, 153, 255),
    Color::rgb(0, 255, 255),
];

pub const TIME_SETTINGS: TimeSettings = TimeSettings {
    refresh_interval_ms: 1000,
    backups_kept: 10,
};

pub const DOCUMENT_KEYS: DocumentKeys = DocumentKeys {
    categories: "categories.json",
    tracks: "tracks.json",
    config: "config.json",
};

pub const PROJECT_DIRS: ProjectNames = ProjectNames {
    qualifier: "com",
    organization: "daytally",
    application: "daytally",
};

pub struct TimeSettings {
    pub refresh_interval_ms: u64,
    pub backups_kept: usize,
}

pub struct DocumentKeys {
    pub categories: &'static str,
    pub tracks: &'static str,
    pub config: &'static str,
}

pub struct ProjectNames {
    pub qualifier: &'static str,
    pub organization: &'static str,
    pub application: &'static str,
}
