/// VibeApp chat client - command line entry point
use colored::Colorize;
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vibe_core::inbox::ConversationList;
use vibe_core::session::{LoadState, PresenceState};
use vibe_core::types::{Conversation, Message, Notification, User};
use vibe_core::{ApiClient, ChatBackend, ChatSession, Config, TransportClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interleave with chat output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let (config, rest) = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let Some(command) = rest.first() else {
        print_usage();
        return Ok(());
    };
    let api = ApiClient::new(&config)?;

    match command.as_str() {
        "login" => {
            let (Some(identifier), Some(password)) = (rest.get(1), rest.get(2)) else {
                eprintln!("Usage: vibe login <username|email> <password>");
                return Ok(());
            };
            let auth = api.login(identifier, password).await?;
            println!("{} Logged in as @{}", "✓".green(), auth.user.username);
            println!("export VIBE_TOKEN={}", auth.token);
        }
        "logout" => {
            api.logout().await?;
            println!("{} Logged out", "✓".green());
        }
        "chats" => {
            let me = api.profile().await?;
            let inbox = ConversationList::new();
            inbox.refresh(&api).await?;
            for chat in inbox.all().await {
                print_conversation(&chat, &me);
            }
            let unread = inbox.total_unread();
            if unread > 0 {
                println!("{}", format!("{} unread", unread).yellow());
            }
        }
        "search" => {
            let query = rest[1..].join(" ");
            for user in api.search_users(&query).await? {
                print_user(&user);
            }
        }
        "follow" | "accept" | "reject" => {
            let Some(user_id) = rest.get(1) else {
                eprintln!("Usage: vibe {} <user_id>", command);
                return Ok(());
            };
            match command.as_str() {
                "follow" => api.follow(user_id).await?,
                "accept" => api.accept(user_id).await?,
                _ => api.reject(user_id).await?,
            }
            println!("{} {} {}", "✓".green(), command, user_id);
        }
        "notifications" => {
            for notification in api.notifications().await? {
                print_notification(&notification);
            }
        }
        "notification-read" | "notification-delete" => {
            let Some(id) = rest.get(1) else {
                eprintln!("Usage: vibe {} <notification_id>", command);
                return Ok(());
            };
            if command == "notification-read" {
                api.mark_notification_read(id).await?;
            } else {
                api.delete_notification(id).await?;
            }
            println!("{} {}", "✓".green(), id);
        }
        "open" => {
            let Some(user_id) = rest.get(1) else {
                eprintln!("Usage: vibe open <user_id>");
                return Ok(());
            };
            let chat = api.access_chat(user_id).await?;
            println!("{}", chat.id);
        }
        "chat" => {
            let Some(conversation_id) = rest.get(1) else {
                eprintln!("Usage: vibe chat <conversation_id>");
                return Ok(());
            };
            run_chat(&config, api, conversation_id).await?;
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!("VibeApp CLI");
    println!();
    println!("Usage: vibe [--api <url>] [--socket <url>] [--token <token>] <command> [args]");
    println!();
    println!("Commands:");
    println!("  login <identifier> <password>   Log in and print a token");
    println!("  logout                          End the session");
    println!("  chats                           List conversations");
    println!("  search <query>                  Search users");
    println!("  follow|accept|reject <user_id>  Follow requests");
    println!("  notifications                   List notifications");
    println!("  notification-read <id>          Mark a notification read");
    println!("  notification-delete <id>        Delete a notification");
    println!("  open <user_id>                  Create or open a conversation");
    println!("  chat <conversation_id>          Interactive chat (Ctrl+D to leave)");
}

/// Interactive chat window: stdin lines are sent, the session view is printed
async fn run_chat(config: &Config, api: ApiClient, conversation_id: &str) -> anyhow::Result<()> {
    let me = api.profile().await?;
    let my_id = me.id.clone();

    let transport = TransportClient::connect(config).await?;
    let inbox = ConversationList::new();
    inbox.refresh(&api).await?;
    inbox.follow(&transport, api.clone());
    if let Some(partner) = inbox.partner_of(conversation_id, &my_id).await {
        println!("{}", format!("Chat with @{}", partner.username).bold());
    }

    let backend: Arc<dyn ChatBackend> = Arc::new(api);
    let (session, task) = ChatSession::spawn(config, me, transport, backend)?;
    session.open(conversation_id)?;
    info!("Chatting in {}", conversation_id);

    // Unread total across conversations, refreshed on every message
    let mut unread = inbox.subscribe();
    let notifier = tokio::spawn(async move {
        while unread.changed().await.is_ok() {
            let total = *unread.borrow_and_update();
            if total > 0 {
                println!("{}", format!("({} unread)", total).yellow());
            }
        }
    });

    let mut updates = session.subscribe();
    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        let mut presence = None;
        let mut failed = false;
        while updates.changed().await.is_ok() {
            let view = updates.borrow_and_update().clone();

            if let LoadState::Failed(reason) = &view.load_state {
                if !failed {
                    eprintln!("{} Could not load history: {}", "✗".red(), reason);
                    failed = true;
                }
            }
            for msg in view.messages.iter().skip(printed) {
                print_message(msg, &my_id);
            }
            printed = view.messages.len();

            if presence != Some(view.presence) {
                let name = view
                    .partner
                    .as_ref()
                    .map(|p| p.display_name().to_string())
                    .unwrap_or_else(|| "Vibe User".to_string());
                println!("{}", describe_presence(&name, &view.presence).dimmed());
                presence = Some(view.presence);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Err(e) = session.send_text(line).await {
                        eprintln!("{} {}", "✗".red(), e);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown();
    let _ = task.await;
    printer.abort();
    notifier.abort();
    Ok(())
}

fn describe_presence(name: &str, presence: &PresenceState) -> String {
    match presence {
        PresenceState::Unknown => name.to_string(),
        PresenceState::Online => format!("{} is online", name),
        PresenceState::Typing => format!("{} is typing...", name),
        PresenceState::Offline { last_seen: Some(seen) } => {
            format!("{} last seen {}", name, seen.format("%H:%M"))
        }
        PresenceState::Offline { last_seen: None } => format!("{} is offline", name),
    }
}

fn print_message(msg: &Message, my_id: &str) {
    let time = msg.created_at.format("%H:%M");
    if msg.sender_id() == my_id {
        let tick = if msg.is_read { "✓".green() } else { "✓".normal() };
        println!("{} {} {} {}", time.to_string().dimmed(), "you:".magenta(), msg.text, tick);
    } else {
        let name = msg
            .sender
            .doc()
            .map(|u| u.username.clone())
            .unwrap_or_else(|| msg.sender_id().to_string());
        println!("{} {} {}", time.to_string().dimmed(), format!("{}:", name).cyan(), msg.text);
    }
}

fn print_conversation(chat: &Conversation, me: &User) {
    let partner = chat
        .partner(&me.id)
        .map(|p| format!("@{}", p.username))
        .unwrap_or_else(|| "?".to_string());
    let preview = chat
        .latest_message
        .as_ref()
        .and_then(|m| m.doc())
        .map(|m| m.text.clone())
        .unwrap_or_default();
    let unread = if chat.unread_count > 0 {
        format!(" ({})", chat.unread_count).yellow().to_string()
    } else {
        String::new()
    };
    println!("{}  {}{}  {}", chat.id.dimmed(), partner.bold(), unread, preview);
}

fn print_user(user: &User) {
    let status = if user.is_online { "online".green() } else { "offline".dimmed() };
    println!("{}  @{}  {}  {}", user.id.dimmed(), user.username.bold(), user.display_name(), status);
}

fn print_notification(n: &Notification) {
    let from = n
        .sender
        .as_ref()
        .map(|s| match s.doc() {
            Some(user) => format!("@{}", user.username),
            None => s.id().to_string(),
        })
        .unwrap_or_default();
    let marker = if n.is_read { " ".normal() } else { "•".yellow() };
    println!(
        "{} {}  {}  {}  {}",
        marker,
        n.id.dimmed(),
        n.kind,
        from,
        n.message.as_deref().unwrap_or("")
    );
}
