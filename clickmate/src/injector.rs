use control::StatusControl;
use input::{EventChannel, EventSink, EV_KEY, EV_SYN, SYN_REPORT};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClickSettings {
    pub button: u16,
    /// How long the button is held, and how long it then stays up.
    pub interval: Duration,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Clicks `settings.button` on the shared channel while running.
///
/// Starting and stopping are idempotent. `stop` returns only once the worker thread has
/// exited, so nothing is injected after it returns. Once `close`d the injector lets go of the
/// channel and never starts again.
pub struct ClickInjector<S> {
    settings: ClickSettings,
    // Held across a whole start, stop or close, join included.
    transition: Mutex<()>,
    channel: Mutex<Option<Arc<EventChannel<S>>>>,
    worker: Mutex<Option<Worker>>,
}

impl<S: EventSink + 'static> ClickInjector<S> {
    pub fn new(channel: Arc<EventChannel<S>>, settings: ClickSettings) -> Self {
        ClickInjector {
            settings,
            transition: Mutex::new(()),
            channel: Mutex::new(Some(channel)),
            worker: Mutex::new(None),
        }
    }

    pub fn status(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Returns whether a worker was started.
    pub fn start(&self) -> bool {
        let _transition = self.transition.lock();
        let channel = match self.channel.lock().clone() {
            Some(channel) => channel,
            None => {
                log::debug!("Click injector closed, not starting");
                return false;
            }
        };

        let mut worker = self.worker.lock();
        if worker.is_some() {
            log::debug!("Click injector already running");
            return false;
        }

        let running = Arc::new(AtomicBool::new(true));
        let spawned = thread::Builder::new().name("click-injector".to_owned()).spawn({
            let settings = self.settings;
            let running = running.clone();
            move || click_loop(&channel, settings, &running)
        });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker { running, handle });
                log::info!("Click injector started");
                true
            }
            Err(err) => {
                log::error!("Failed to start click injector: {}", err);
                false
            }
        }
    }

    /// Returns whether a worker was stopped.
    pub fn stop(&self) -> bool {
        let _transition = self.transition.lock();
        self.stop_worker()
    }

    /// Stops the worker for good and drops the channel.
    pub fn close(&self) {
        let _transition = self.transition.lock();
        self.stop_worker();
        self.channel.lock().take();
    }

    // Callers hold the transition lock.
    fn stop_worker(&self) -> bool {
        let worker = match self.worker.lock().take() {
            Some(worker) => worker,
            None => {
                log::debug!("Click injector not running");
                return false;
            }
        };

        worker.running.store(false, Ordering::SeqCst);
        if worker.handle.join().is_err() {
            log::error!("Click injector panicked");
        }

        log::info!("Click injector stopped");
        true
    }
}

impl<S: EventSink + 'static> StatusControl for ClickInjector<S> {
    fn status(&self) -> bool {
        ClickInjector::status(self)
    }

    fn set_status(&self, enabled: bool) {
        if enabled {
            self.start();
        } else {
            self.stop();
        }
    }
}

impl<S> Drop for ClickInjector<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.running.store(false, Ordering::SeqCst);
            let _ = worker.handle.join();
        }
    }
}

fn click_loop<S: EventSink>(channel: &EventChannel<S>, settings: ClickSettings, running: &AtomicBool) {
    // Emit failures are logged by the channel and don't stop the clicking.
    while running.load(Ordering::SeqCst) {
        log::debug!("Click");
        let _ = channel.emit(EV_KEY, settings.button, 1);
        let _ = channel.emit(EV_SYN, SYN_REPORT, 0);
        thread::sleep(settings.interval);

        let _ = channel.emit(EV_KEY, settings.button, 0);
        let _ = channel.emit(EV_SYN, SYN_REPORT, 0);
        thread::sleep(settings.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use input::{InputEvent, BTN_LEFT};
    use std::io::{Error, ErrorKind};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<(Instant, InputEvent)>>>,
        attempts: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Recorder {
        fn events(&self) -> Vec<InputEvent> {
            self.events.lock().iter().map(|(_, event)| *event).collect()
        }

        fn presses(&self) -> Vec<Instant> {
            self.events
                .lock()
                .iter()
                .filter(|(_, event)| event.type_ == EV_KEY && event.value == 1)
                .map(|(at, _)| *at)
                .collect()
        }
    }

    impl EventSink for Recorder {
        fn write_event(&mut self, event: &InputEvent) -> Result<(), Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ErrorKind::BrokenPipe.into());
            }

            self.events.lock().push((Instant::now(), *event));
            Ok(())
        }
    }

    fn injector(recorder: &Recorder, interval_ms: u64) -> ClickInjector<Recorder> {
        ClickInjector::new(
            Arc::new(EventChannel::new(recorder.clone())),
            ClickSettings {
                button: BTN_LEFT,
                interval: Duration::from_millis(interval_ms),
            },
        )
    }

    #[test]
    fn starts_idle() {
        let recorder = Recorder::default();
        let injector = injector(&recorder, 10);

        assert!(!injector.status());
        assert!(!injector.stop());
        thread::sleep(Duration::from_millis(30));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn clicks_in_whole_cycles() {
        let recorder = Recorder::default();
        let injector = injector(&recorder, 10);

        assert!(injector.start());
        assert!(injector.status());
        thread::sleep(Duration::from_millis(100));
        assert!(injector.stop());
        assert!(!injector.status());

        let events = recorder.events();
        assert!(events.len() >= 4);
        assert_eq!(events.len() % 4, 0);
        for cycle in events.chunks(4) {
            let shape: Vec<_> = cycle.iter().map(|e| (e.type_, e.code, e.value)).collect();
            assert_eq!(
                shape,
                vec![
                    (EV_KEY, BTN_LEFT, 1),
                    (EV_SYN, SYN_REPORT, 0),
                    (EV_KEY, BTN_LEFT, 0),
                    (EV_SYN, SYN_REPORT, 0),
                ]
            );
        }
    }

    #[test]
    fn second_start_keeps_one_worker() {
        let recorder = Recorder::default();
        let injector = injector(&recorder, 20);

        assert!(injector.start());
        assert!(!injector.start());
        assert!(injector.status());
        thread::sleep(Duration::from_millis(200));
        injector.stop();

        // A single worker sleeps through a hold and a release between presses.
        let presses = recorder.presses();
        assert!(presses.len() >= 2);
        for pair in presses.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(40));
        }
    }

    #[test]
    fn nothing_is_injected_after_stop() {
        let recorder = Recorder::default();
        let injector = injector(&recorder, 15);

        injector.start();
        thread::sleep(Duration::from_millis(50));
        injector.stop();
        let stopped = Instant::now();
        let count = recorder.events().len();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(recorder.events().len(), count);
        assert!(recorder.events.lock().iter().all(|(at, _)| *at <= stopped));
    }

    #[test]
    fn stop_waits_at_most_a_cycle() {
        let recorder = Recorder::default();
        let injector = injector(&recorder, 50);

        injector.start();
        thread::sleep(Duration::from_millis(10));
        let stopping = Instant::now();
        injector.stop();

        assert!(stopping.elapsed() < Duration::from_millis(100 + 150));
    }

    #[test]
    fn restarts() {
        let recorder = Recorder::default();
        let injector = injector(&recorder, 5);

        injector.start();
        injector.stop();
        let count = recorder.events().len();

        assert!(injector.start());
        thread::sleep(Duration::from_millis(30));
        injector.stop();
        assert!(recorder.events().len() > count);
    }

    #[test]
    fn keeps_clicking_through_write_failures() {
        let recorder = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let injector = injector(&recorder, 5);

        injector.start();
        thread::sleep(Duration::from_millis(50));
        assert!(injector.status());
        injector.stop();

        assert!(recorder.attempts.load(Ordering::SeqCst) >= 8);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn concurrent_toggles_settle() {
        let recorder = Recorder::default();
        let injector = Arc::new(injector(&recorder, 2));

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let injector = injector.clone();
                thread::spawn(move || {
                    for round in 0..10 {
                        injector.set_status((i + round) % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        let enabled = injector.status();
        let before = recorder.events().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.events().len() > before, enabled);

        injector.stop();
        let count = recorder.events().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.events().len(), count);
    }

    #[test]
    fn closing_stops_and_releases_the_channel() {
        let recorder = Recorder::default();
        let channel = Arc::new(EventChannel::new(recorder.clone()));
        let injector = ClickInjector::new(
            channel.clone(),
            ClickSettings {
                button: BTN_LEFT,
                interval: Duration::from_millis(5),
            },
        );

        injector.start();
        injector.close();
        assert!(!injector.status());
        assert_eq!(Arc::strong_count(&channel), 1);

        // A late request to turn on is refused.
        injector.set_status(true);
        assert!(!injector.start());
        assert!(!injector.status());

        let count = recorder.events().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.events().len(), count);
        assert!(Arc::try_unwrap(channel).is_ok());
    }

    #[test]
    fn dropping_stops_the_worker() {
        let recorder = Recorder::default();
        let injector = injector(&recorder, 5);

        injector.start();
        drop(injector);
        let count = recorder.events().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.events().len(), count);
    }
}
