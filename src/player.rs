use crate::display::{highlighted_line, item_label};
use crate::engine::ToneEngine;
use crate::model::config::PlaybackConfig;
use crate::model::melody::Melody;
use crate::util::check_speed;
use anyhow::bail;
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MAX_SLEEP_CHUNK_S: f64 = 0.050;

enum ControlMsg {
    Stop,
}

#[derive(Debug, Clone)]
struct LoadedMelody {
    title: String,
    items: Melody,
}

/// Clears the playing flag when the worker exits, however it exits.
struct PlayingGuard(Arc<AtomicBool>);

impl Drop for PlayingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct Player<E: ToneEngine> {
    verbose: bool,
    playback: PlaybackConfig,
    engine: Arc<E>,
    loaded: Mutex<Option<LoadedMelody>>,
    playing: Arc<AtomicBool>,
    control_tx: Mutex<Option<Sender<ControlMsg>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<E: ToneEngine + 'static> Player<E> {
    pub fn new(engine: E, verbose: bool, speed: f64) -> anyhow::Result<Self> {
        Self::with_config(
            engine,
            verbose,
            PlaybackConfig {
                speed,
                ..PlaybackConfig::default()
            },
        )
    }

    pub fn with_config(engine: E, verbose: bool, playback: PlaybackConfig) -> anyhow::Result<Self> {
        check_speed(playback.speed)?;
        if !playback.note_gap_ms.is_finite() || playback.note_gap_ms < 0.0 {
            bail!("Note gap must be zero or more milliseconds..!");
        }

        Ok(Self {
            verbose,
            playback,
            engine: Arc::new(engine),
            loaded: Mutex::new(None),
            playing: Arc::new(AtomicBool::new(false)),
            control_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn load_melody(&self, title: &str, melody: Melody) -> anyhow::Result<()> {
        if melody.is_empty() {
            warn!("Loaded melody '{}' has no items..!", title);
        }

        let Ok(mut loaded) = self.loaded.lock() else {
            bail!("Failed to lock the loaded melody..!");
        };

        info!("Loaded melody: '{}' with {} item(s)..!", title, melody.len());
        *loaded = Some(LoadedMelody {
            title: title.to_string(),
            items: melody,
        });

        Ok(())
    }

    pub fn play(&self, join: bool) -> anyhow::Result<()> {
        let melody = {
            let Ok(loaded) = self.loaded.lock() else {
                bail!("Failed to lock the loaded melody..!")
            };

            match loaded.as_ref() {
                Some(melody) if !melody.items.is_empty() => melody.clone(),
                _ => bail!("No melody loaded..!"),
            }
        };

        if self
            .playing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("Playback already running..!")
        }

        let Ok(mut wh) = self.worker_handle.lock() else {
            self.playing.store(false, Ordering::SeqCst);
            bail!("Failed to lock worker handle..!")
        };

        // A previous detached run has already finished, reap it.
        if let Some(stale) = wh.take() {
            let _ = stale.join();
        }

        let engine = Arc::clone(&self.engine);
        let (tx, rx) = mpsc::channel::<ControlMsg>();

        {
            let Ok(mut ctl) = self.control_tx.lock() else {
                self.playing.store(false, Ordering::SeqCst);
                bail!("Failed to lock control_tx..!")
            };

            *ctl = Some(tx);
        }

        let verbose = self.verbose;
        let speed = self.playback.speed;
        let gap_ms = self.playback.note_gap_ms / speed;
        let guard = PlayingGuard(Arc::clone(&self.playing));

        let handle = thread::spawn(move || {
            let _guard = guard;
            let ctrl_rx = rx;

            #[cfg(target_os = "windows")]
            {
                use windows::Win32::System::Threading::{
                    GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_HIGHEST,
                };
                unsafe {
                    if SetThreadPriority(GetCurrentThread(), THREAD_PRIORITY_HIGHEST).is_ok() {
                        debug!("Playback thread priority set to HIGHEST..!");
                    } else {
                        warn!("Failed to set playback thread priority..!");
                    }
                }
            }

            let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

            info!("Playing '{}' at {}x speed..!", melody.title, speed);

            let start = Instant::now();
            let mut cursor_ms = 0.0;

            for (index, item) in melody.items.iter().enumerate() {
                if ctrl_rx.try_recv().is_ok() {
                    stop_engine(engine.as_ref());
                    warn!(
                        "Playback stopped via control message after {:.3} seconds..!",
                        start.elapsed().as_secs_f64()
                    );
                    return;
                }

                let at_ms = start.elapsed().as_secs_f64() * 1000.0;
                if verbose {
                    info!("{}", highlighted_line(&melody.items, index));
                    info!(
                        "{:>4} | {:<14} | at {:>11.3}ms | scheduled for: {:>11.3}ms | duration: {:>6}ms",
                        index,
                        item_label(item),
                        at_ms,
                        cursor_ms,
                        item.duration_ms
                    );
                }

                for note in item.notes.names() {
                    if let Err(why) = engine.play_tone(note, item.duration_ms as f64, speed) {
                        warn!("Tone error for {} at {:.3}ms | why: {:?}", note, at_ms, why);
                    }
                }

                cursor_ms += item.duration_ms as f64 / speed;
                if !wait_until(start, cursor_ms, &ctrl_rx, &sleeper) {
                    stop_engine(engine.as_ref());
                    warn!("Playback stopped during item {}..!", index);
                    return;
                }

                cursor_ms += gap_ms;
                if !wait_until(start, cursor_ms, &ctrl_rx, &sleeper) {
                    stop_engine(engine.as_ref());
                    warn!("Playback stopped during the gap after item {}..!", index);
                    return;
                }
            }

            info!(
                "Playback thread finished all {} item(s)..!",
                melody.items.len()
            );
        });

        if join {
            drop(wh);
            if handle.join().is_err() {
                bail!("Playback thread panicked..!");
            }
        } else {
            *wh = Some(handle);
        }

        Ok(())
    }

    pub fn stop(&self) -> anyhow::Result<()> {
        let tx = {
            let Ok(mut lock) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!")
            };
            lock.take()
        };

        if let Some(tx) = tx {
            let _ = tx.send(ControlMsg::Stop);
        } else {
            bail!("No worker is running playback..!")
        }

        let Ok(mut lock) = self.worker_handle.lock() else {
            bail!("Failed to lock worker_handle..!")
        };

        if let Some(handle) = lock.take() {
            let _ = handle.join();
            debug!("Playback thread joined..!");
            info!("Stopped playback thread..!");
        }

        Ok(())
    }
}

fn stop_engine<E: ToneEngine>(engine: &E) {
    if let Err(why) = engine.silence() {
        warn!("Failed to silence the engine..! why: {:?}", why);
    }
}

/// Sleeps in short chunks until `target_ms` after `start`. Returns false if a stop arrived first.
fn wait_until(
    start: Instant,
    target_ms: f64,
    ctrl_rx: &Receiver<ControlMsg>,
    sleeper: &SpinSleeper,
) -> bool {
    let target = start + Duration::from_secs_f64(target_ms.max(0.0) / 1000.0);

    loop {
        if ctrl_rx.try_recv().is_ok() {
            return false;
        }

        let now = Instant::now();
        if now >= target {
            return true;
        }

        let remaining = (target - now).as_secs_f64();
        sleeper.sleep(Duration::from_secs_f64(remaining.min(MAX_SLEEP_CHUNK_S)));
    }
}
