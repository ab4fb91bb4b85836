use std::sync::RwLock;

static INET_PROCESS: RwLock<Option<String>> = RwLock::new(None);

/// Selects the TCP/IP transport process used by sockets allocated afterwards.
///
/// The selection is process-wide, like the host call it stands in for.
pub fn set_inet_process(name: &str) {
    log::info!("Selecting TCP/IP transport process {name}");
    let mut current = INET_PROCESS.write().unwrap_or_else(|e| e.into_inner());
    *current = Some(name.to_owned());
}

/// The currently selected transport process, if any.
pub fn inet_process() -> Option<String> {
    INET_PROCESS.read().unwrap_or_else(|e| e.into_inner()).clone()
}
