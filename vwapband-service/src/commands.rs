//! Bot commands: parsing, execution against the hub, Telegram polling.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Pid, System};
use tracing::{info, warn};
use vwapband_core::PositionState;

use crate::config::AppConfig;
use crate::hub::EngineHub;
use crate::notify::NotifyError;

/// Replies longer than this are split across messages.
const CHUNK_LIMIT: usize = 3000;

const RULE: &str = "━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    Positions,
    List,
    Settings,
    Cpu,
    Mem,
    Memory,
    Help,
}

impl Command {
    /// Parse a message as a command. Strips a trailing `@botname`, so
    /// `/status@my_bot` in a group chat still parses.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let word = word.split('@').next()?;
        match word {
            "/start" | "/run" => Some(Self::Start),
            "/stop" => Some(Self::Stop),
            "/status" => Some(Self::Status),
            "/positions" | "/pos" => Some(Self::Positions),
            "/list" => Some(Self::List),
            "/settings" => Some(Self::Settings),
            "/cpu" => Some(Self::Cpu),
            "/mem" => Some(Self::Mem),
            "/memory" | "/memry" => Some(Self::Memory),
            "/help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Executes commands against the hub and renders replies.
pub struct CommandHandler {
    hub: Arc<EngineHub>,
    config: AppConfig,
    started_at: chrono::DateTime<chrono::Utc>,
    system: Mutex<System>,
    pid: Pid,
}

impl CommandHandler {
    pub fn new(hub: Arc<EngineHub>, config: AppConfig) -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            hub,
            config,
            started_at: chrono::Utc::now(),
            system: Mutex::new(system),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    /// Run one command. Returns the reply messages to send, in order;
    /// long replies are pre-chunked.
    pub fn execute(&self, command: Command) -> Vec<String> {
        match command {
            Command::Start => {
                if self.hub.is_running() {
                    vec!["✅ Bot is already running!".to_string()]
                } else {
                    self.hub.set_running(true);
                    vec!["🚀 Bot started successfully!".to_string()]
                }
            }
            Command::Stop => {
                if !self.hub.is_running() {
                    vec!["⚠️ Bot is already stopped!".to_string()]
                } else {
                    self.hub.set_running(false);
                    vec!["🛑 Bot stopped! Use /start to resume.".to_string()]
                }
            }
            Command::Status => vec![self.render_status()],
            Command::Positions => vec![self.render_positions()],
            Command::List => self.render_list(),
            Command::Settings => vec![self.render_settings()],
            Command::Cpu => vec![self.render_cpu()],
            Command::Mem => vec![self.render_mem()],
            Command::Memory => {
                vec![format!("{}{}", self.render_cpu(), self.render_mem())]
            }
            Command::Help => vec![HELP_TEXT.to_string()],
        }
    }

    fn render_status(&self) -> String {
        let status = self.hub.status();
        let uptime = chrono::Utc::now() - self.started_at;
        let hours = uptime.num_hours();
        let minutes = uptime.num_minutes() % 60;

        let longs = status
            .symbols
            .iter()
            .filter(|s| s.position.state == PositionState::Long)
            .count();
        let shorts = status
            .symbols
            .iter()
            .filter(|s| s.position.state == PositionState::Short)
            .count();

        format!(
            "📊 *STATUS*\n{RULE}\
             🤖 Bot: {}\n\
             ⏱ Uptime: {hours}h {minutes}m\n\
             📈 Positions: {}\n   • Longs: {longs}\n   • Shorts: {shorts}\n\
             📊 Signals: {}\n\
             🛑 Stoploss: {}%\n\
             🪙 Symbols: {}\n{RULE}",
            if status.running { "🟢 Running" } else { "🔴 Stopped" },
            longs + shorts,
            status.signals_today,
            self.config.engine.stoploss_percent,
            status.symbols.len(),
        )
    }

    fn render_positions(&self) -> String {
        let status = self.hub.status();
        let open: Vec<_> = status
            .symbols
            .iter()
            .filter(|s| s.position.state.is_open())
            .collect();

        if open.is_empty() {
            return "📊 No active positions".to_string();
        }

        let mut msg = format!("*Positions ({}):*\n\n", open.len());
        for s in open {
            let emoji = if s.position.state == PositionState::Long { "🟢" } else { "🔴" };
            msg.push_str(&format!("{emoji} {}\n", s.symbol));
            if let Some(entry) = s.position.entry_price {
                msg.push_str(&format!("Entry: {entry:.4}\n"));
            }
            if let Some(stop) = s.position.stop_price {
                msg.push_str(&format!("SL: {stop:.4}\n"));
            }
            msg.push('\n');
        }
        msg
    }

    fn render_list(&self) -> Vec<String> {
        let status = self.hub.status();
        if status.symbols.is_empty() {
            return vec!["No symbols!".to_string()];
        }

        let mut messages = Vec::new();
        let mut msg = String::from("*Active Symbols:*\n");
        for s in &status.symbols {
            let emoji = match s.position.state {
                PositionState::Long => "🟢",
                PositionState::Short => "🔴",
                PositionState::None => "⚪",
            };
            match (s.position.state.is_open(), s.position.entry_price) {
                (true, Some(entry)) => {
                    msg.push_str(&format!("{emoji} {} @ {entry:.4}\n", s.symbol))
                }
                _ => msg.push_str(&format!("{emoji} {}\n", s.symbol)),
            }
            if msg.len() > CHUNK_LIMIT {
                messages.push(std::mem::take(&mut msg));
            }
        }
        if !msg.is_empty() {
            messages.push(msg);
        }
        messages
    }

    fn render_settings(&self) -> String {
        format!(
            "⚙️ *SETTINGS*\n{RULE}\
             📊 Interval: {}\n\
             📈 Band Mult: {}x\n\
             📐 Mode: {:?}\n\
             ⏱ Session Delay: {}m\n\
             ⏸ Cooldown: {}m\n\
             🛑 Stoploss: {}%\n\
             🔄 Catch-up: {}s\n{RULE}",
            self.config.interval,
            self.config.engine.band_multiplier,
            self.config.engine.calc_mode,
            self.config.engine.session_delay_min,
            self.config.engine.cooldown_min,
            self.config.engine.stoploss_percent,
            self.config.feed.catchup_interval_secs,
        )
    }

    fn render_cpu(&self) -> String {
        let stats = self.sample_process_stats();
        format!(
            "⚡ *CPU USAGE*\n{RULE}\
             🤖 Bot: {:.1}%\n\
             💻 System: {:.1}%\n\
             🔢 Cores: {}\n{RULE}",
            stats.process_cpu, stats.system_cpu, stats.cpu_count,
        )
    }

    fn render_mem(&self) -> String {
        let stats = self.sample_process_stats();
        format!(
            "💾 *MEMORY USAGE*\n{RULE}\
             🤖 Bot: {:.1} MB\n\
             📊 System: {:.1}%\n\
             💻 Available: {:.1} GB\n\
             📁 Total: {:.1} GB\n{RULE}",
            stats.process_memory_mb,
            stats.system_memory_pct,
            stats.available_gb,
            stats.total_gb,
        )
    }

    fn sample_process_stats(&self) -> ProcessStats {
        let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
        // CPU usage is a delta between refreshes, so sample twice.
        system.refresh_all();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_all();

        let (process_cpu, process_memory_mb) = system
            .process(self.pid)
            .map(|p| (p.cpu_usage(), p.memory() as f64 / 1024.0 / 1024.0))
            .unwrap_or((0.0, 0.0));
        let total = system.total_memory() as f64;
        let available = system.available_memory() as f64;
        let system_memory_pct = if total > 0.0 {
            (total - available) / total * 100.0
        } else {
            0.0
        };

        ProcessStats {
            process_cpu,
            system_cpu: system.global_cpu_info().cpu_usage(),
            cpu_count: system.cpus().len(),
            process_memory_mb,
            system_memory_pct,
            available_gb: available / 1024.0 / 1024.0 / 1024.0,
            total_gb: total / 1024.0 / 1024.0 / 1024.0,
        }
    }
}

struct ProcessStats {
    process_cpu: f32,
    system_cpu: f32,
    cpu_count: usize,
    process_memory_mb: f64,
    system_memory_pct: f64,
    available_gb: f64,
    total_gb: f64,
}

const HELP_TEXT: &str = "📚 *COMMANDS*\n━━━━━━━━━━━\n\
/start - Start bot\n\
/stop - Stop bot\n\
/status - Full status\n\
/positions - Active trades\n\
/list - All symbols\n\
/settings - Bot settings\n\
/memory - CPU & memory usage\n\
/help - This help\n\
━━━━━━━━━━━";

/// Long-polls `getUpdates` and feeds parsed commands to the handler.
///
/// Replies go back to the chat the command came from, not the signal
/// channel.
pub struct TelegramCommandPoller {
    client: reqwest::blocking::Client,
    base_url: String,
    token: String,
    handler: CommandHandler,
    last_update_id: Option<i64>,
}

impl TelegramCommandPoller {
    pub fn new(token: impl Into<String>, handler: CommandHandler) -> Result<Self, NotifyError> {
        Self::with_base_url("https://api.telegram.org", token, handler)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        handler: CommandHandler,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            handler,
            last_update_id: None,
        })
    }

    /// Poll forever. Backs off on consecutive errors rather than spinning.
    pub fn run(&mut self) {
        info!("telegram command poller started");
        let mut consecutive_errors = 0u32;

        loop {
            match self.poll_once() {
                Ok(()) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(error = %e, consecutive_errors, "getUpdates failed");
                    let backoff = Duration::from_secs(u64::from(consecutive_errors.min(12)) * 5);
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    fn poll_once(&mut self) -> Result<(), NotifyError> {
        let mut url = format!(
            "{}/bot{}/getUpdates?timeout=25&allowed_updates=%5B%22message%22%5D",
            self.base_url, self.token
        );
        if let Some(last) = self.last_update_id {
            url.push_str(&format!("&offset={}", last + 1));
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        let payload: serde_json::Value = resp
            .json()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        if payload.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(NotifyError::Rejected(payload.to_string()));
        }

        let updates = payload
            .get("result")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        for update in updates {
            if let Some(id) = update.get("update_id").and_then(|v| v.as_i64()) {
                self.last_update_id = Some(id);
            }
            let message = match update.get("message") {
                Some(m) => m,
                None => continue,
            };
            let chat_id = message
                .get("chat")
                .and_then(|c| c.get("id"))
                .and_then(|v| v.as_i64());
            let text = message.get("text").and_then(|v| v.as_str()).unwrap_or("");

            let (chat_id, command) = match (chat_id, Command::parse(text)) {
                (Some(chat_id), Some(command)) => (chat_id, command),
                _ => continue,
            };

            info!(chat_id, ?command, "handling command");
            for reply in self.handler.execute(command) {
                if let Err(e) = self.send_reply(chat_id, &reply) {
                    warn!(error = %e, "failed to send command reply");
                }
            }
        }
        Ok(())
    }

    fn send_reply(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        self.client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| NotifyError::Network(e.to_string()))?;
        Ok(())
    }
}
