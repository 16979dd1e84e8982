//! PTY (console) comms channel — interactive chat on stdin/stdout.
//!
//! Asks for a style once at start, then alternates between an optional
//! per-turn style switch and the user's message. Proactive messages from the
//! auto companion are printed as they arrive. Runs until `exit`/`quit`, EOF,
//! or the `shutdown` token is cancelled (Ctrl-C).

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::companion::style;
use super::channel::{Channel, ChannelFuture};
use super::state::{CommsEvent, CommsState};

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    companion_name: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(
        channel_id: impl Into<String>,
        companion_name: impl Into<String>,
        state: Arc<CommsState>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            companion_name: companion_name.into(),
            state,
        }
    }
}

impl Channel for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ChannelFuture {
        Box::pin(run_pty(self.channel_id, self.companion_name, self.state, shutdown))
    }
}

// ── console helpers ──────────────────────────────────────────────────────────

/// What the next input line means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    InitialStyle,
    TurnStyle,
    Message,
}

impl Stage {
    fn prompt(self) -> &'static str {
        match self {
            Stage::InitialStyle => "\n请选择你喜欢的风格类型：",
            Stage::TurnStyle => "\n本轮对话请选择风格类型（回车默认不变）：",
            Stage::Message => "\n你：",
        }
    }
}

fn is_exit(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit")
}

/// Numbered style menu shown at start.
fn style_menu() -> String {
    let mut menu = String::from("\n可选风格：");
    for (i, (name, description)) in style::catalogue().iter().enumerate() {
        menu.push_str(&format!("\n{}. {name} - {description}", i + 1));
    }
    menu
}

/// Menu numbers map to catalogue entries; anything else is taken as a style name.
fn resolve_style_choice(input: &str) -> String {
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| style::catalogue().get(i))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| input.to_string())
}

fn print_prompt(stage: Stage) {
    print!("{}", stage.prompt());
    let _ = std::io::stdout().flush();
}

// ── run_pty ──────────────────────────────────────────────────────────────────

async fn run_pty(
    channel_id: String,
    name: String,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started");
    println!("欢迎和{name}聊天！输入 'exit' 或 'quit' 结束对话。");
    println!("{}", style_menu());

    let mut proactive = state.subscribe();
    let mut proactive_open = true;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stage = Stage::InitialStyle;
    print_prompt(stage);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received, closing console channel");
                info!("pty channel shutting down");
                break;
            }

            msg = proactive.recv(), if proactive_open => {
                match msg {
                    Ok(text) => {
                        println!("\n{name}：{text}");
                        print_prompt(stage);
                    }
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "console missed proactive messages"),
                    Err(RecvError::Closed) => proactive_open = false,
                }
            }

            line = lines.next_line() => {
                let input = match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => input.trim().to_string(),
                };

                stage = match stage {
                    Stage::InitialStyle => {
                        if !input.is_empty() {
                            state.set_style(&resolve_style_choice(&input)).await;
                        }
                        println!("\n{name}已经准备好和你聊天了！");
                        println!("提示：");
                        println!("- 可以随时切换风格类型");
                        println!("- {name}会记住你们的对话");
                        println!("- 可以分享你的日常生活");
                        Stage::TurnStyle
                    }
                    Stage::TurnStyle => {
                        if is_exit(&input) {
                            break;
                        }
                        if !input.is_empty() {
                            state.set_style(&resolve_style_choice(&input)).await;
                        }
                        Stage::Message
                    }
                    Stage::Message => {
                        if is_exit(&input) {
                            break;
                        }
                        if input.is_empty() {
                            print_prompt(stage);
                            continue;
                        }
                        debug!(input = %input, "pty received line");
                        match state.send_message(&channel_id, input).await {
                            Err(e) => {
                                warn!("send_message error: {e}, pty exiting");
                                break;
                            }
                            Ok(reply) => println!("\n{name}：{reply}"),
                        }
                        Stage::TurnStyle
                    }
                };
                print_prompt(stage);
            }
        }
    }

    // Leaving the console stops the whole service.
    shutdown.cancel();
    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words() {
        assert!(is_exit("exit"));
        assert!(is_exit("QUIT"));
        assert!(!is_exit("退出吧"));
    }

    #[test]
    fn menu_lists_every_style() {
        let menu = style_menu();
        assert!(menu.contains("1. 撒娇型 - 可爱亲昵，喜欢撒娇"));
        assert!(menu.contains("5. 日常型"));
    }

    #[test]
    fn numeric_choice_maps_to_catalogue() {
        assert_eq!(resolve_style_choice("3"), "温柔型");
        assert_eq!(resolve_style_choice("可爱型"), "可爱型");
        assert_eq!(resolve_style_choice("0"), "0");
        assert_eq!(resolve_style_choice("9"), "9");
    }
}
