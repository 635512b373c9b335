pub mod clock;
pub mod config;
pub mod events;
pub mod platform {
    pub mod audio;
    pub mod display;
    pub mod files;
    pub mod process;
    pub mod signals;
}
pub mod processing {
    pub mod color;
    pub mod compose;
    pub mod decode;
    pub mod idle;
    pub mod layout;
    pub mod overlay;
    pub mod text;
}
pub mod tasks {
    pub mod controller;
    pub mod handoff;
    pub mod indexer;
    pub mod interrupt;
    pub mod pan_zoom;
    pub mod playlist;
    pub mod status;
    pub mod transition;
}
