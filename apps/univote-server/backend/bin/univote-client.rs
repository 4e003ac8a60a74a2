use clap::Parser;
use reqwest::Url;
use types_rs::univote::{Faculty, ItemKind};
use univote_server::client::Client;
use uuid::Uuid;

#[derive(Parser)]
struct App {
    #[clap(flatten)]
    opts: GlobalOpts,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Parser)]
struct GlobalOpts {
    #[clap(
        long,
        env = "UNIVOTE_SERVER_URL",
        default_value = "http://localhost:8000"
    )]
    univote_server_url: Url,

    /// Token printed by `login`.
    #[clap(long, env = "UNIVOTE_TOKEN")]
    token: Option<String>,
}

impl GlobalOpts {
    fn client(&self) -> Client {
        let mut client = Client::new(self.univote_server_url.clone());
        if let Some(token) = &self.token {
            client.set_bearer_token(token.clone());
        }
        client
    }
}

#[derive(Parser)]
enum Command {
    /// Log in and print a session token.
    Login(LoginOpts),
    /// List the elections or polls you can see.
    List(ListOpts),
    /// List the candidates or options of an item.
    Selections(SelectionsOpts),
    /// Cast a ballot.
    Vote(VoteOpts),
    /// Show the results of a closed item.
    Results(ItemOpts),
}

#[derive(Parser)]
struct LoginOpts {
    university_id: String,

    #[clap(long, env = "UNIVOTE_PASSWORD")]
    password: String,
}

#[derive(Parser)]
struct ListOpts {
    /// `election` or `poll`.
    kind: ItemKind,
}

#[derive(Parser)]
struct ItemOpts {
    kind: ItemKind,
    item_id: Uuid,
}

#[derive(Parser)]
struct SelectionsOpts {
    kind: ItemKind,
    item_id: Uuid,

    /// Only show candidates from this faculty.
    #[clap(long)]
    faculty: Option<Faculty>,
}

#[derive(Parser)]
struct VoteOpts {
    kind: ItemKind,
    item_id: Uuid,
    selection_id: Uuid,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();

    let app = App::parse();
    let mut client = app.opts.client();

    match app.command {
        Command::Login(LoginOpts {
            university_id,
            password,
        }) => {
            let voter = client.login(&university_id, &password).await?;
            println!("logged in as {} ({})", voter.name, voter.role.as_str());
            if let Some(token) = client.bearer_token() {
                println!("export UNIVOTE_TOKEN={token}");
            }
        }
        Command::List(ListOpts { kind }) => {
            for entry in client.list_items(kind).await? {
                println!(
                    "{id}  {status:<9}  {title}",
                    id = entry.item.id,
                    status = entry.computed_status.to_string(),
                    title = entry.item.title
                );
            }
        }
        Command::Selections(SelectionsOpts {
            kind,
            item_id,
            faculty,
        }) => {
            for selection in client
                .list_selections(kind, item_id, faculty.as_ref())
                .await?
            {
                println!("{}  {}", selection.id, selection.name);
            }
        }
        Command::Vote(VoteOpts {
            kind,
            item_id,
            selection_id,
        }) => match client.cast_vote(kind, item_id, selection_id).await {
            Ok(ballot) => println!("ballot recorded at {}", ballot.cast_at),
            Err(e) if e.is_retryable() => {
                println!("temporary failure, trying once more: {e}");
                let ballot = client.cast_vote(kind, item_id, selection_id).await?;
                println!("ballot recorded at {}", ballot.cast_at);
            }
            Err(e) => return Err(e.into()),
        },
        Command::Results(ItemOpts { kind, item_id }) => {
            let tally = client.results(kind, item_id).await?;
            println!("{}", serde_json::to_string_pretty(&tally)?);
        }
    }

    Ok(())
}
