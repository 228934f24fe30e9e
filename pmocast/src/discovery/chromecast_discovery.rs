//! Cast receiver discovery via mDNS.
//!
//! Cast receivers advertise themselves on the `_googlecast._tcp.local`
//! service. The browse runs on its own thread with the async-std executor
//! the `mdns` crate is built on; answers are turned into [`Device`]s and
//! pushed to the [`DiscoverySink`].

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use futures_util::{pin_mut, stream::StreamExt};
use tracing::{debug, warn};

use crate::discovery::{DiscoveryBackend, DiscoverySink};
use crate::errors::CastError;
use crate::model::{DEFAULT_CAST_PORT, Device, DeviceId, DiscoveryFilter, ScanMode};
use crate::online::DEFAULT_MAX_AGE;

const SERVICE_NAME: &str = "_googlecast._tcp.local";
const POLL_TICK: Duration = Duration::from_millis(500);
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct MdnsSettings {
    pub active_interval: Duration,
    /// Passive mode keeps querying, only less often.
    pub passive_interval: Duration,
    pub device_max_age: Duration,
}

impl Default for MdnsSettings {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_secs(3),
            passive_interval: Duration::from_secs(30),
            device_max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl MdnsSettings {
    fn query_interval(&self, mode: ScanMode) -> Duration {
        match mode {
            ScanMode::Active => self.active_interval,
            ScanMode::Passive => self.passive_interval,
        }
    }
}

struct BrowseWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct MdnsDiscoveryBackend {
    settings: MdnsSettings,
    mode: Arc<Mutex<ScanMode>>,
    worker: Option<BrowseWorker>,
}

impl MdnsDiscoveryBackend {
    pub fn new(settings: MdnsSettings) -> Self {
        Self {
            settings,
            mode: Arc::new(Mutex::new(ScanMode::Passive)),
            worker: None,
        }
    }
}

impl DiscoveryBackend for MdnsDiscoveryBackend {
    fn start(
        &mut self,
        filter: &DiscoveryFilter,
        mode: ScanMode,
        sink: DiscoverySink,
    ) -> Result<(), CastError> {
        self.stop();
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;

        // Les annonces mDNS ne listent pas les applications installées :
        // un receiver sans l'application échouera au LAUNCH.
        debug!(app_id = %filter.receiver_app_id, "mDNS browse does not pre-filter by application");

        let stop = Arc::new(AtomicBool::new(false));
        let settings = self.settings.clone();
        let mode = Arc::clone(&self.mode);
        let stop_for_thread = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("pmocast-mdns".into())
            .spawn(move || {
                async_std::task::block_on(browse(sink, settings, mode, stop_for_thread));
            })
            .map_err(|e| CastError::Discovery(format!("cannot spawn mDNS thread: {}", e)))?;

        self.worker = Some(BrowseWorker { stop, handle });
        Ok(())
    }

    fn set_mode(&mut self, mode: ScanMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Relaxed);
            if worker.handle.join().is_err() {
                warn!("mDNS browse thread panicked");
            }
        }
    }
}

impl Drop for MdnsDiscoveryBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn current_mode(mode: &Mutex<ScanMode>) -> ScanMode {
    *mode.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn browse(
    sink: DiscoverySink,
    settings: MdnsSettings,
    mode: Arc<Mutex<ScanMode>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let browsing_mode = current_mode(&mode);
        let interval = settings.query_interval(browsing_mode);

        let discovery = match mdns::discover::all(SERVICE_NAME, interval) {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!("Failed to start mDNS browse: {}", e);
                async_std::task::sleep(RETRY_DELAY).await;
                continue;
            }
        };
        debug!(mode = ?browsing_mode, interval_secs = interval.as_secs(), "mDNS browse started");

        let stream = discovery.listen();
        pin_mut!(stream);

        // Un changement de mode relance la requête avec le nouvel intervalle,
        // le registre n'est pas touché.
        while !stop.load(Ordering::Relaxed) && current_mode(&mode) == browsing_mode {
            match async_std::future::timeout(POLL_TICK, stream.next()).await {
                Ok(Some(Ok(response))) => {
                    if let Some(announcement) = CastAnnouncement::from_response(&response) {
                        announcement.report(&sink, settings.device_max_age);
                    }
                }
                Ok(Some(Err(e))) => warn!("mDNS response error: {}", e),
                Ok(None) => break,
                Err(_) => {}
            }
            sink.expire_stale(Instant::now());
        }
    }
    debug!("mDNS browse stopped");
}

/// The parts of an mDNS answer a Cast receiver is identified by.
#[derive(Clone, Debug, Default, PartialEq)]
struct CastAnnouncement {
    instance: String,
    addresses: Vec<IpAddr>,
    port: Option<u16>,
    txt: HashMap<String, String>,
    goodbye: bool,
}

impl CastAnnouncement {
    fn from_response(response: &mdns::Response) -> Option<Self> {
        let instance = response.records().find_map(|r| {
            if let mdns::RecordKind::PTR(ref name) = r.kind {
                Some(name.clone())
            } else {
                None
            }
        })?;

        let addresses = response
            .records()
            .filter_map(|r| match r.kind {
                mdns::RecordKind::A(addr) => Some(IpAddr::V4(addr)),
                mdns::RecordKind::AAAA(addr) => Some(IpAddr::V6(addr)),
                _ => None,
            })
            .collect();

        let port = response.records().find_map(|r| {
            if let mdns::RecordKind::SRV { port, .. } = r.kind {
                Some(port)
            } else {
                None
            }
        });

        let txt = parse_txt_entries(response.records().flat_map(|r| match r.kind {
            mdns::RecordKind::TXT(ref data) => data.clone(),
            _ => Vec::new(),
        }));

        // Goodbye packets carry TTL 0 on every record.
        let goodbye = response.records().all(|r| r.ttl == 0);

        Some(Self {
            instance,
            addresses,
            port,
            txt,
            goodbye,
        })
    }

    fn device_id(&self) -> DeviceId {
        match self.txt.get("id") {
            Some(id) if !id.is_empty() => DeviceId(id.clone()),
            _ => DeviceId(self.instance.clone()),
        }
    }

    fn to_device(&self) -> Option<Device> {
        // Prefer IPv4 addresses
        let host = self
            .addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| self.addresses.first())?;

        let friendly_name = self
            .txt
            .get("fn")
            .cloned()
            .unwrap_or_else(|| friendly_name_from_instance(&self.instance));

        let mut device = Device {
            id: self.device_id(),
            friendly_name,
            host: host.to_string(),
            port: self.port.unwrap_or(DEFAULT_CAST_PORT),
            model_name: None,
        };
        if let Some(model) = self.txt.get("md") {
            device = device.with_model(model.clone());
        }
        Some(device)
    }

    fn report(&self, sink: &DiscoverySink, max_age: Duration) {
        if self.goodbye {
            sink.device_offline(&self.device_id());
            return;
        }
        match self.to_device() {
            Some(device) => sink.device_online(device, max_age),
            None => debug!(instance = %self.instance, "Cast announcement without address, ignored"),
        }
    }
}

/// Parses `key=value` TXT strings; entries without `=` are dropped.
fn parse_txt_entries<I, S>(entries: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.as_ref().split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Derives a display name from a service instance such as
/// `Salon-5f0e1d2c3b4a59687766554433221100._googlecast._tcp.local`.
fn friendly_name_from_instance(instance: &str) -> String {
    let name = instance
        .split("._googlecast._tcp.local")
        .next()
        .unwrap_or_default()
        .split('-')
        .take_while(|part| part.len() != 32)
        .collect::<Vec<_>>()
        .join("-");
    let name = name.trim();
    if name.is_empty() {
        "Unknown Chromecast".to_string()
    } else {
        name.to_string()
    }
}
