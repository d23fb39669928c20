//! Process-backed speech output for the terminal: a speech synthesizer command
//! (e.g. `espeak-ng`) for native voices and an audio player command (e.g.
//! `mpv`) for server audio.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::error::{ClientError, ClientResult};
use crate::speech::{AudioSink, SpeechEngine, Utterance, Voice};

/// Words per minute at rate 1.0 for the synthesizer.
const BASE_WPM: f32 = 175.0;

const IPC_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

struct Running {
    kill: Option<oneshot::Sender<()>>,
    done: Arc<AtomicBool>,
}

/// At most one child process, watched until it exits or is killed.
#[derive(Default)]
struct ProcessSlot {
    running: Mutex<Option<Running>>,
}

impl ProcessSlot {
    /// Tracks `child`; `keep_alive` is dropped once the process is gone.
    fn track<K: Send + 'static>(&self, mut child: Child, keep_alive: K) {
        let (kill_tx, kill_rx) = oneshot::channel();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    tracing::debug!("Playback process exited: {:?}", status);
                }
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!("Could not stop playback process: {}", e);
                    }
                }
            }
            flag.store(true, Ordering::SeqCst);
            drop(keep_alive);
        });

        if let Ok(mut slot) = self.running.lock() {
            if let Some(previous) = slot.replace(Running {
                kill: Some(kill_tx),
                done,
            }) {
                stop_running(previous);
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|r| !r.done.load(Ordering::SeqCst)))
            .unwrap_or(false)
    }

    fn stop(&self) {
        if let Some(running) = self.running.lock().ok().and_then(|mut slot| slot.take()) {
            stop_running(running);
        }
    }
}

fn stop_running(mut running: Running) {
    if let Some(kill) = running.kill.take() {
        let _ = kill.send(());
    }
}

/// Native voices through a speech synthesizer command.
pub struct CommandSpeechEngine {
    program: Option<String>,
    voices: Vec<Voice>,
    slot: ProcessSlot,
}

impl CommandSpeechEngine {
    /// `program` of `None` means no native speech; `voices` are the locale
    /// tags the synthesizer is known to have.
    pub fn new(program: Option<String>, voices: &[String]) -> Self {
        let voices = match program {
            Some(_) => voices
                .iter()
                .map(|lang| Voice {
                    name: lang.clone(),
                    lang: lang.clone(),
                })
                .collect(),
            None => Vec::new(),
        };
        Self {
            program,
            voices,
            slot: ProcessSlot::default(),
        }
    }
}

impl SpeechEngine for CommandSpeechEngine {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn is_speaking(&self) -> bool {
        self.slot.is_running()
    }

    fn speak(&self, utterance: Utterance) -> ClientResult<()> {
        let Some(program) = &self.program else {
            return Err(ClientError::Unavailable("Speech synthesis".into()));
        };
        let voice = utterance
            .voice
            .as_ref()
            .map(|v| v.lang.clone())
            .unwrap_or(utterance.lang);
        let wpm = (BASE_WPM * utterance.rate).round() as u32;

        let child = Command::new(program)
            .arg("-v")
            .arg(voice.to_lowercase())
            .arg("-s")
            .arg(wpm.to_string())
            .arg(&utterance.text)
            .kill_on_drop(true)
            .spawn()?;
        self.slot.track(child, ());
        Ok(())
    }

    fn cancel(&self) {
        self.slot.stop();
    }
}

/// Plays audio bytes with an external player. `{file}`, `{rate}` and `{ipc}`
/// in the argument list are substituted per playback.
///
/// When the arguments carry `{ipc}` (mpv's `--input-ipc-server`), rate changes
/// reach the running player over that socket. Otherwise they apply from the
/// next playback.
pub struct CommandAudioSink {
    program: String,
    args: Vec<String>,
    slot: ProcessSlot,
    socket: Mutex<Option<PathBuf>>,
}

/// Files that must outlive the player process.
struct PlaybackFiles {
    _audio: tempfile::NamedTempFile,
    _ipc_dir: Option<tempfile::TempDir>,
}

impl CommandAudioSink {
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            slot: ProcessSlot::default(),
            socket: Mutex::new(None),
        }
    }

    fn wants_ipc(&self) -> bool {
        self.args.iter().any(|arg| arg.contains("{ipc}"))
    }

    fn expand_args(&self, file: &str, rate: f32, ipc: Option<&Path>) -> Vec<String> {
        let ipc = ipc.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{file}", file)
                    .replace("{rate}", &rate.to_string())
                    .replace("{ipc}", &ipc)
            })
            .collect()
    }

    fn current_socket(&self) -> Option<PathBuf> {
        self.socket.lock().ok().and_then(|socket| socket.clone())
    }
}

/// mpv JSON IPC command setting the playback speed, newline terminated.
fn speed_command(rate: f32) -> String {
    let mut line = serde_json::json!({ "command": ["set_property", "speed", rate] }).to_string();
    line.push('\n');
    line
}

#[cfg(unix)]
fn send_ipc(socket: &Path, line: &str) -> std::io::Result<()> {
    let mut stream = std::os::unix::net::UnixStream::connect(socket)?;
    stream.set_write_timeout(Some(IPC_WRITE_TIMEOUT))?;
    stream.write_all(line.as_bytes())
}

#[cfg(not(unix))]
fn send_ipc(_socket: &Path, _line: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "player control sockets need a unix platform",
    ))
}

impl AudioSink for CommandAudioSink {
    fn play(&self, audio: Vec<u8>, rate: f32) -> ClientResult<()> {
        let mut file = tempfile::Builder::new()
            .prefix("krishi-tts-")
            .suffix(".mp3")
            .tempfile()?;
        file.write_all(&audio)?;
        file.flush()?;

        let ipc_dir = if self.wants_ipc() {
            Some(tempfile::Builder::new().prefix("krishi-player-").tempdir()?)
        } else {
            None
        };
        let socket = ipc_dir.as_ref().map(|dir| dir.path().join("player.sock"));

        let path = file.path().to_string_lossy().into_owned();
        let child = Command::new(&self.program)
            .args(self.expand_args(&path, rate, socket.as_deref()))
            .kill_on_drop(true)
            .spawn()?;
        if let Ok(mut current) = self.socket.lock() {
            *current = socket;
        }
        self.slot.track(
            child,
            PlaybackFiles {
                _audio: file,
                _ipc_dir: ipc_dir,
            },
        );
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.slot.is_running()
    }

    fn set_rate(&self, rate: f32) {
        let socket = match self.current_socket() {
            Some(socket) if self.slot.is_running() => socket,
            _ => {
                tracing::debug!("Playback rate {} applies to the next playback", rate);
                return;
            }
        };
        match send_ipc(&socket, &speed_command(rate)) {
            Ok(()) => tracing::debug!("Playback rate set to {}", rate),
            Err(e) => tracing::warn!("Could not change playback rate: {}", e),
        }
    }

    fn stop(&self) {
        self.slot.stop();
        if let Ok(mut socket) = self.socket.lock() {
            socket.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn player_args_are_expanded() {
        let sink = CommandAudioSink::new(
            "mpv",
            &args(&["--really-quiet", "--speed={rate}", "--input-ipc-server={ipc}", "{file}"]),
        );
        assert!(sink.wants_ipc());
        assert_eq!(
            sink.expand_args("/tmp/a.mp3", 1.25, Some(Path::new("/tmp/p/player.sock"))),
            vec!["--really-quiet", "--speed=1.25", "--input-ipc-server=/tmp/p/player.sock", "/tmp/a.mp3"]
        );
    }

    #[test]
    fn speed_command_is_mpv_json() {
        let line = speed_command(1.25);
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value, serde_json::json!({"command": ["set_property", "speed", 1.25]}));
    }

    #[test]
    fn rate_without_player_is_deferred() {
        let sink = CommandAudioSink::new("mpv", &args(&["--input-ipc-server={ipc}", "{file}"]));
        sink.set_rate(1.5);
        assert!(!sink.is_playing());
        assert!(sink.current_socket().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn live_rate_reaches_the_running_player() {
        use std::io::{BufRead, BufReader};
        use std::os::unix::net::UnixListener;

        // `sh -c 'sleep 5' <socket> <file>`: the shell ignores the extra operands.
        let sink = CommandAudioSink::new("sh", &args(&["-c", "sleep 5", "{ipc}", "{file}"]));
        sink.play(vec![0x49, 0x44, 0x33], 1.0).unwrap();
        assert!(sink.is_playing());

        let socket = sink.current_socket().unwrap();
        let listener = UnixListener::bind(&socket).unwrap();
        sink.set_rate(1.25);

        let (stream, _) = listener.accept().unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["command"], serde_json::json!(["set_property", "speed", 1.25]));

        sink.stop();
        assert!(sink.current_socket().is_none());
    }

    #[test]
    fn engine_without_program_has_no_voices() {
        let engine = CommandSpeechEngine::new(None, &["hi-IN".to_string()]);
        assert!(engine.voices().is_empty());
        assert!(!engine.is_speaking());
        let err = engine
            .speak(Utterance {
                text: "x".into(),
                lang: "hi-IN".into(),
                voice: None,
                rate: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::Unavailable(_)));
    }

    #[test]
    fn engine_lists_configured_voices() {
        let engine = CommandSpeechEngine::new(Some("espeak-ng".into()), &["hi-IN".to_string(), "en-IN".to_string()]);
        let langs: Vec<String> = engine.voices().into_iter().map(|v| v.lang).collect();
        assert_eq!(langs, vec!["hi-IN", "en-IN"]);
    }
}
