use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use frames::{EventKind, Frame};
use serde::Serialize;
use socialnet::api::types::{NewPost, NewUser, PostUpdate, ReactionKind};
use socialnet::{ApiClient, ApiError, ClientConfig, ConnectionEvent, ConnectionState, RealtimeClient};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("not logged in; run `socialnet login <username>` first")]
    NotLoggedIn,
    #[error("realtime socket closed before the frame was sent")]
    NotSent,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("gave up reconnecting to the realtime socket")]
    ReconnectsExhausted,
    #[error("nothing to update; pass --content or --image-url")]
    EmptyUpdate,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "socialnet", about = "Social network API and realtime CLI")]
struct Cli {
    #[arg(long, env = "SOCIAL_API_BASE_URL")]
    api_base_url: Option<String>,

    #[arg(long, env = "SOCIAL_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, env = "SOCIAL_TOKEN_FILE", default_value = ".socialnet-token.json")]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/').clone_into(&mut config.api_base_url);
        }
        if let Some(url) = &self.ws_url {
            url.trim_end_matches('/').clone_into(&mut config.ws_url);
        }
        config.token_file = Some(self.token_file.clone());
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        username: String,
        #[arg(long, env = "SOCIAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        full_name: String,
        #[arg(long, env = "SOCIAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    Refresh,
    Me,
    Users,
    Posts(PostsCommand),
    Stories(StoriesCommand),
    Messages(MessagesCommand),
    Ws(WsCommand),
}

#[derive(Args, Debug)]
struct PostsCommand {
    #[command(subcommand)]
    command: PostsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PostsSubcommand {
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
    },
    Sample,
    Show {
        post_id: i64,
    },
    Create {
        content: String,
        #[arg(long)]
        image_url: Option<String>,
    },
    Edit {
        post_id: i64,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
    },
    Like {
        post_id: i64,
    },
    React {
        post_id: i64,
        #[arg(help = "like, love, haha, wow, sad or angry")]
        reaction: ReactionKind,
    },
    Delete {
        post_id: i64,
    },
    Comment {
        post_id: i64,
        content: String,
    },
}

#[derive(Args, Debug)]
struct StoriesCommand {
    #[command(subcommand)]
    command: StoriesSubcommand,
}

#[derive(Subcommand, Debug)]
enum StoriesSubcommand {
    List,
    View { story_id: i64 },
}

#[derive(Args, Debug)]
struct MessagesCommand {
    #[command(subcommand)]
    command: MessagesSubcommand,
}

#[derive(Subcommand, Debug)]
enum MessagesSubcommand {
    Chats,
    Thread { user_id: i64 },
    Send { user_id: i64, content: String },
    Read { user_id: i64 },
}

#[derive(Args, Debug)]
struct WsCommand {
    #[command(subcommand)]
    command: WsSubcommand,
}

#[derive(Subcommand, Debug)]
enum WsSubcommand {
    /// Print inbound frames as JSON lines until interrupted.
    Listen {
        #[arg(long, help = "Stop after this many seconds")]
        seconds: Option<u64>,
    },
    /// Send a chat message over the socket and print the server's echo.
    Send {
        #[arg(long)]
        to: i64,
        content: String,
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config();
    tracing::debug!(api = %config.api_base_url, ws = %config.ws_url, token_file = ?config.token_file, "client config");
    let (api, realtime) = socialnet::build_clients(&config)?;

    match cli.command {
        Command::Login { username, password } => {
            let tokens = api.login(&username, &password).await?;
            eprintln!("logged in as {username} ({} token saved)", tokens.token_type);
            Ok(())
        }
        Command::Register { email, username, full_name, password } => {
            print_json(&api.register(&NewUser { email, username, full_name, password }).await?)
        }
        Command::Logout => print_json(&api.logout().await?),
        Command::Refresh => {
            api.refresh().await?;
            eprintln!("access token refreshed");
            Ok(())
        }
        Command::Me => print_json(&api.current_user().await?),
        Command::Users => print_json(&api.users().await?),
        Command::Posts(posts) => run_posts(&api, posts).await,
        Command::Stories(stories) => run_stories(&api, stories).await,
        Command::Messages(messages) => run_messages(&api, messages).await,
        Command::Ws(ws) => {
            if !api.is_authenticated() {
                return Err(CliError::NotLoggedIn);
            }
            match ws.command {
                WsSubcommand::Listen { seconds } => ws_listen(&realtime, seconds).await,
                WsSubcommand::Send { to, content, timeout_secs } => {
                    ws_send(&realtime, to, &content, Duration::from_secs(timeout_secs)).await
                }
            }
        }
    }
}

async fn run_posts(api: &ApiClient, posts: PostsCommand) -> Result<(), CliError> {
    match posts.command {
        PostsSubcommand::List { page, per_page } => print_json(&api.posts(page, per_page).await?),
        PostsSubcommand::Sample => print_json(&api.sample_posts().await?),
        PostsSubcommand::Show { post_id } => print_json(&api.post(post_id).await?),
        PostsSubcommand::Create { content, image_url } => {
            print_json(&api.create_post(&NewPost { content, image_url }).await?)
        }
        PostsSubcommand::Edit { post_id, content, image_url } => {
            if content.is_none() && image_url.is_none() {
                return Err(CliError::EmptyUpdate);
            }
            print_json(&api.update_post(post_id, &PostUpdate { content, image_url }).await?)
        }
        PostsSubcommand::Like { post_id } => print_json(&api.like_post(post_id).await?),
        PostsSubcommand::React { post_id, reaction } => print_json(&api.react_to_post(post_id, reaction).await?),
        PostsSubcommand::Delete { post_id } => print_json(&api.delete_post(post_id).await?),
        PostsSubcommand::Comment { post_id, content } => print_json(&api.create_comment(post_id, &content).await?),
    }
}

async fn run_stories(api: &ApiClient, stories: StoriesCommand) -> Result<(), CliError> {
    match stories.command {
        StoriesSubcommand::List => print_json(&api.stories().await?),
        StoriesSubcommand::View { story_id } => print_json(&api.mark_story_viewed(story_id).await?),
    }
}

async fn run_messages(api: &ApiClient, messages: MessagesCommand) -> Result<(), CliError> {
    match messages.command {
        MessagesSubcommand::Chats => print_json(&api.chats().await?),
        MessagesSubcommand::Thread { user_id } => print_json(&api.messages_with(user_id).await?),
        MessagesSubcommand::Send { user_id, content } => print_json(&api.send_message(user_id, &content).await?),
        MessagesSubcommand::Read { user_id } => print_json(&api.mark_messages_read(user_id).await?),
    }
}

async fn ws_listen(realtime: &RealtimeClient, seconds: Option<u64>) -> Result<(), CliError> {
    let kinds = [
        EventKind::Message,
        EventKind::Typing,
        EventKind::MessageRead,
        EventKind::UserStatus,
        EventKind::from("online_users"),
    ];
    for kind in kinds {
        realtime.on_message(kind, |frame: &Frame| println!("{}", frames::encode_frame(frame)));
    }

    let mut events = realtime.subscribe();
    realtime.connect();

    let deadline = async {
        match seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => std::future::pending().await,
        }
    };
    let exhausted = async {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::ReconnectsExhausted) | Err(RecvError::Closed) => return,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    };

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => signal.map_err(CliError::from),
        () = deadline => Ok(()),
        () = exhausted => Err(CliError::ReconnectsExhausted),
    };
    realtime.disconnect();
    result
}

async fn ws_send(realtime: &RealtimeClient, to: i64, content: &str, wait: Duration) -> Result<(), CliError> {
    let (tx, mut echoes) = tokio::sync::mpsc::unbounded_channel();
    realtime.on_chat_message(move |message| {
        let _ = tx.send(message);
    });

    let mut state = realtime.watch_state();
    realtime.connect();
    let connected = tokio::time::timeout(wait, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .is_ok_and(|result| result.is_ok());
    if !connected {
        realtime.disconnect();
        return Err(CliError::Timeout("realtime connection"));
    }

    if !realtime.send_message(to, content) {
        realtime.disconnect();
        return Err(CliError::NotSent);
    }

    // The server echoes each chat message back to its sender once stored.
    let echo = tokio::time::timeout(wait, async {
        while let Some(message) = echoes.recv().await {
            if message.receiver_id == to && message.content == content {
                return Some(message);
            }
        }
        None
    })
    .await;
    realtime.disconnect();

    match echo {
        Ok(Some(message)) => print_json(&message),
        _ => Err(CliError::Timeout("message echo")),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
