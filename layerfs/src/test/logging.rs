use std::sync::Mutex;

use lazy_static::lazy_static;

lazy_static! {
    static ref LOG_READY: Mutex<bool> = Mutex::new(false);
}

/// Sends log output to stdout. Safe to call from every test.
pub fn init_log() {
    let mut ready = LOG_READY.lock().unwrap();
    if !*ready {
        use log::LevelFilter;
        use log4rs::{
            append::console::ConsoleAppender,
            config::{Appender, Config, Root},
            encode::pattern::PatternEncoder,
        };

        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{l:<5} {M} - {m}{n}")))
            .build();
        let config = Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Debug))
            .unwrap();

        log4rs::init_config(config).unwrap();
        *ready = true;
    }
}
