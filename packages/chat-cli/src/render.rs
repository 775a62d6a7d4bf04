//! Terminal output.

use chat_client::UserProfile;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use messaging::{Notice, NoticeLevel, Thread};

fn short_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%b %d %H:%M").to_string()
}

fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut)
}

pub fn print_threads(threads: &[Thread]) {
    if threads.is_empty() {
        println!("{}", "No conversations".dimmed());
        return;
    }

    for thread in threads {
        let name = if thread.unread_count > 0 {
            thread.participant_name.bold()
        } else {
            thread.participant_name.normal()
        };
        let badge = if thread.unread_count > 0 {
            format!(" ({})", thread.unread_count).bright_red().bold().to_string()
        } else {
            String::new()
        };
        let when = thread
            .last_message_time
            .map(short_time)
            .unwrap_or_default();

        println!(
            "{:<24} {}{} {}",
            thread.id.dimmed(),
            name,
            badge,
            format!("[{}]", thread.participant_type.label()).cyan()
        );
        println!("    {} {}", preview(&thread.last_message, 60), when.dimmed());
    }
}

pub fn print_thread(thread: &Thread, self_id: &str) {
    println!(
        "{} {}",
        thread.participant_name.bold(),
        format!("[{}]", thread.participant_type.label()).cyan()
    );
    if !thread.participant_email.is_empty() {
        println!("{}", thread.participant_email.dimmed());
    }
    println!();

    if thread.messages.is_empty() {
        println!("{}", "No messages yet".dimmed());
        return;
    }

    for message in &thread.messages {
        let sender = if message.sender_id == self_id {
            "You".bright_blue().bold()
        } else if message.read {
            message.sender_name.normal()
        } else {
            message.sender_name.bright_yellow().bold()
        };
        println!("{} {}", sender, short_time(message.created_at).dimmed());
        println!("  {}", message.content);
    }
}

pub fn print_incoming(thread: &Thread) {
    let Some(message) = thread.messages.last() else {
        return;
    };
    println!(
        "{} {} {}",
        "→".bright_green(),
        thread.participant_name.bold(),
        preview(&message.content, 80)
    );
}

pub fn print_users(users: &[UserProfile]) {
    for user in users {
        println!(
            "{:<24} {} {}",
            user.id.dimmed(),
            user.display_name().unwrap_or_default(),
            user.role.as_deref().unwrap_or("").cyan()
        );
    }
}

pub fn print_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Error => eprintln!("{} {}", "✗".bright_red(), notice.message),
        NoticeLevel::Info => eprintln!("{} {}", "ℹ".bright_blue(), notice.message),
    }
}
