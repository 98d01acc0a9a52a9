//! Interactive CLI for the StockX quoter
//!
//! A thin consumer of the orchestrator's four operations (start, scan,
//! execute, stop) plus the pricing formulas and the Glin message
//! builder. All real logic lives in the library.

use std::io::Write;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::oneshot;

use stockx_quoter::payment::{self, GlinClient};
use stockx_quoter::pricing::{calculate_service_price, format_usd, Category};
use stockx_quoter::quoter::{Credentials, Quoter, QuoterConfig, SizeOption};
use stockx_quoter::store::SessionStore;

#[derive(Parser, Debug)]
#[command(
    name = "stockx-quoter",
    about = "Quote StockX checkout prices and build payment messages"
)]
struct Args {
    /// Run the browser without a visible window (needs a saved session)
    #[arg(long)]
    headless: bool,

    /// Ignore any saved session and perform a fresh login
    #[arg(long)]
    fresh: bool,

    /// StockX account email
    #[arg(long, env = "STOCKX_EMAIL")]
    email: String,

    /// StockX account password
    #[arg(long, env = "STOCKX_PASSWORD", hide_env_values = true)]
    password: String,

    /// Glin account email (enables payment messages)
    #[arg(long, env = "GLIN_EMAIL")]
    glin_email: Option<String>,

    /// Glin account password
    #[arg(long, env = "GLIN_PASSWORD", hide_env_values = true)]
    glin_password: Option<String>,
}

impl Args {
    fn glin_credentials(&self) -> Option<Credentials> {
        match (&self.glin_email, &self.glin_password) {
            (Some(email), Some(password)) => Some(Credentials {
                email: email.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

/// Prompt on stdout and read one trimmed line from stdin
async fn prompt(message: &str) -> anyhow::Result<String> {
    print!("{}", message);
    std::io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        std::io::stdin().read_line(&mut buf).map(|_| buf)
    })
    .await
    .context("stdin reader task failed")??;

    Ok(line.trim().to_string())
}

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(50));
    println!(" {}", title);
    println!("{}\n", "=".repeat(50));
}

fn print_size_table(options: &[SizeOption]) {
    println!("{:<5} | {:<30}", "ID", "Size Info");
    println!("{}", "-".repeat(40));
    for option in options {
        println!("{:<5} | {}", option.index, option.text);
    }
    println!("{}", "-".repeat(40));
}

async fn pick_category_override(current: Category) -> anyhow::Result<Category> {
    println!("\nSelect Category: 1. Sneakers, 2. T-Shirt, 3. Hoodie, 4. Jacket");
    let choice = prompt("Enter number: ").await?;
    let category = match choice.as_str() {
        "1" => Category::Sneakers,
        "2" => Category::TShirt,
        "3" => Category::Hoodie,
        "4" => Category::Jacket,
        _ => current,
    };
    println!("Category updated to: {}", category);
    Ok(category)
}

/// One Enter press, delivered through a oneshot so the library can
/// await the acknowledgment without touching stdin itself
fn acknowledgment_on_enter() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let mut buf = String::new();
        let _ = std::io::stdin().read_line(&mut buf);
        let _ = tx.send(());
    });
    rx
}

async fn offer_glin_message(args: &Args, final_quote: f64) -> anyhow::Result<()> {
    let Some(credentials) = args.glin_credentials() else {
        return Ok(());
    };

    let answer = prompt("\nGenerate Glin payment message? (y/n): ").await?;
    if answer.to_lowercase() != "y" && answer.to_lowercase() != "s" {
        return Ok(());
    }

    let size = prompt("Size sent (e.g. 9.5, L): ").await?;
    let with_link = prompt("Also generate a payment link? (y/n): ").await?;
    let generate_link = with_link.to_lowercase() == "y";

    println!("\nStarting Glin quote (this can take a few seconds)...");
    let mut glin = match GlinClient::new(Some(credentials)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not build the Glin client: {}", e);
            return Ok(());
        }
    };

    match glin.quote(final_quote, generate_link).await {
        Ok(quote) => {
            println!("\n{}", "=".repeat(40));
            println!("{}", payment::format_glin_message(final_quote, &quote, &size));
            println!("{}", "=".repeat(40));
            if let Some(ref link) = quote.payment_link {
                println!("\n{}", payment::format_payment_link_message(link));
            }
        }
        Err(e) => eprintln!("Failed to fetch the Glin quote: {}", e),
    }

    Ok(())
}

fn print_quote_result(category: Category, captured_total: f64) {
    let service_price = calculate_service_price(captured_total, category);
    print_header("Final Quote Result");
    println!("Category:      {}", category);
    println!("StockX Total:  {}", format_usd(captured_total));
    println!("{}", "-".repeat(30));
    println!("FINAL QUOTE:   {}", format_usd(service_price));
    println!("{}\n", "=".repeat(30));
}

async fn manual_mode(quoter: &mut Quoter, args: &Args) -> anyhow::Result<()> {
    print_header("Manual Mode");
    println!("1. Navigate manually to the FINAL checkout/review page.");
    println!("2. Ensure the 'Total' price is visible on screen.");
    println!("3. Press Enter here when ready to capture...");

    let ready = acknowledgment_on_enter();
    let captured = quoter.capture_price_manual(ready).await?;

    let Some(total) = captured else {
        println!("Could not capture price in Manual Mode.");
        return Ok(());
    };

    let input = prompt("Enter Category (Sneakers/T-Shirt/Hoodie/Jacket) [default Sneakers]: ").await?;
    let category = Category::from_input(&input);

    print_quote_result(category, total);
    let service_price = calculate_service_price(total, category);
    offer_glin_message(args, service_price).await
}

async fn quote_flow(quoter: &mut Quoter, args: &Args, url: &str) -> anyhow::Result<()> {
    print_header("Scanning Product");
    println!("URL: {}", url);
    println!("Analyzing page...");

    let options = match quoter.scan_sizes(url).await {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Scan failed: {}", e);
            return Ok(());
        }
    };

    if options.is_empty() {
        println!("No sizes found (one-size item, out of stock, or page not loaded).");
        return Ok(());
    }

    let mut category = quoter.category();
    print_header(&format!("Select Size | Category: {}", category));
    print_size_table(&options);

    let selected = loop {
        println!("\nCurrent Category: {}", category);
        let choice =
            prompt("Enter ID to Quote (or 'cat' to change category, 'c' to cancel): ").await?;

        if choice.eq_ignore_ascii_case("c") {
            break None;
        }
        if choice.eq_ignore_ascii_case("cat") {
            category = pick_category_override(category).await?;
            quoter.set_category(category);
            continue;
        }
        match choice.parse::<usize>() {
            Ok(index) if options.iter().any(|o| o.index == index) => break Some(index),
            Ok(_) => println!("Invalid ID."),
            Err(_) => println!("Invalid input."),
        }
    };

    let Some(index) = selected else {
        return Ok(());
    };

    print_header("Processing Quote");
    println!("Selected ID: {}", index);
    println!("Clicking buttons and fetching price...");

    match quoter.execute_quote(index).await {
        Ok(result) => match result.total {
            Some(total) => {
                print_quote_result(result.category, total);
                let service_price = calculate_service_price(total, result.category);
                offer_glin_message(args, service_price).await?;
            }
            None => {
                println!("\nFailed to retrieve the final price (reached stage: {:?}).", result.stage);
                println!("Use 'm' for manual capture on the open page.");
            }
        },
        Err(e) => eprintln!("Quote failed: {}", e),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = stockx_quoter::init_logging();

    print_header("StockX Automatic Quoter - Initializing");

    let has_saved_session = SessionStore::at_default("session.json").path().exists();
    let use_saved_session = has_saved_session && !args.fresh;

    if use_saved_session {
        println!(">> Saved session found: reusing it, skipping login.");
    } else {
        println!(">> First run (or --fresh): starting visible mode to log in and save the session.");
    }

    let config = QuoterConfig {
        credentials: Credentials {
            email: args.email.clone(),
            password: args.password.clone(),
        },
        // A fresh login always needs a window the human can help in
        headless: args.headless && use_saved_session,
        use_saved_session,
        state_path: None,
    };

    let mut quoter = Quoter::new(config);

    // Surface the challenge handler's suspended state on the terminal
    // so an invisible wait never looks like a hang.
    let awaiting = quoter.awaiting_human();
    tokio::spawn(async move {
        let mut was_waiting = false;
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let waiting = awaiting.load(Ordering::SeqCst);
            if waiting && !was_waiting {
                println!("\n[waiting for you] Solve the challenge in the browser window.");
            }
            if !waiting && was_waiting {
                println!("[resumed] Challenge cleared.");
            }
            was_waiting = waiting;
        }
    });

    quoter.start().await.context("failed to start the browser session")?;

    loop {
        print_header("Product Selection");
        let input =
            prompt("Enter StockX Product URL (or 'q' to quit, 'm' for manual mode): ").await?;

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("q") {
            break;
        }

        let result = if input.eq_ignore_ascii_case("m") {
            manual_mode(&mut quoter, &args).await
        } else {
            quote_flow(&mut quoter, &args, &input).await
        };

        if let Err(e) = result {
            eprintln!("An error occurred: {}", e);
        }

        println!("Resetting for next item...");
    }

    println!("Exiting...");
    quoter.stop().await;
    Ok(())
}
