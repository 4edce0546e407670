//! Rendering of controller state
//!
//! [`render`] is a pure function from [`ControllerState`] to a [`Screen`].
//! [`render_html`] turns a screen into an unstyled HTML page whose controls
//! post to the routes in [`crate::server::routes`]. [`render_text`] is the
//! plain-text form used by the CLI.

use std::fmt::Write as _;

use uuid::Uuid;

use crate::controller::form::is_web_url;
use crate::controller::{ControllerState, SignedIn};

const SAVE_LABEL: &str = "Save Bookmark";
const SAVING_LABEL: &str = "Saving...";
const EMPTY_MESSAGE: &str = "No bookmarks saved yet.";

/// Add-form as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormView {
    pub title: String,
    pub url: String,
    pub submit_label: &'static str,
    pub submit_disabled: bool,
}

/// One row of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub id: Uuid,
    pub title: String,
    pub url: String,
}

/// Signed-in page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarksView {
    pub email: String,
    pub form: FormView,
    pub items: Vec<ItemView>,
    /// Shown instead of the list when it is empty.
    pub empty_message: Option<&'static str>,
    pub notice: Option<String>,
}

/// The three things the user can be looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Loading,
    SignIn { provider_label: &'static str },
    Bookmarks(BookmarksView),
}

/// Renders controller state.
///
/// # Examples
///
/// ```
/// use bookmark_manager::controller::ControllerState;
/// use bookmark_manager::view::{render, Screen};
///
/// assert_eq!(render(&ControllerState::Loading), Screen::Loading);
/// assert!(matches!(render(&ControllerState::SignedOut), Screen::SignIn { .. }));
/// ```
pub fn render(state: &ControllerState) -> Screen {
    match state {
        ControllerState::Loading => Screen::Loading,
        ControllerState::SignedOut => Screen::SignIn {
            provider_label: "Sign in with Google",
        },
        ControllerState::SignedIn(signed_in) => Screen::Bookmarks(bookmarks_view(signed_in)),
    }
}

fn bookmarks_view(state: &SignedIn) -> BookmarksView {
    let items: Vec<ItemView> = state
        .bookmarks
        .iter()
        .map(|row| ItemView {
            id: row.id,
            title: row.title.clone(),
            url: row.url.clone(),
        })
        .collect();

    BookmarksView {
        email: state.session.email.clone(),
        form: FormView {
            title: state.form.title.clone(),
            url: state.form.url.clone(),
            submit_label: if state.adding { SAVING_LABEL } else { SAVE_LABEL },
            submit_disabled: state.adding,
        },
        empty_message: items.is_empty().then_some(EMPTY_MESSAGE),
        items,
        notice: state.sync_error.clone(),
    }
}

/// Renders a screen as a complete HTML document.
pub fn render_html(screen: &Screen) -> String {
    let mut body = String::new();
    match screen {
        Screen::Loading => body.push_str("<p role=\"status\">Loading...</p>\n"),
        Screen::SignIn { provider_label } => {
            body.push_str("<h1>Bookmark Manager</h1>\n");
            body.push_str("<p>Secure Google-only access to your links</p>\n");
            let _ = writeln!(
                body,
                "<a href=\"/auth/sign-in\">{}</a>",
                escape_html(provider_label)
            );
        }
        Screen::Bookmarks(view) => {
            body.push_str("<h1>My Bookmarks</h1>\n");
            let _ = writeln!(
                body,
                "<p>Logged in as: <strong>{}</strong></p>",
                escape_html(&view.email)
            );
            body.push_str(
                "<form method=\"post\" action=\"/auth/sign-out\"><button type=\"submit\">Switch Account / Sign Out</button></form>\n",
            );
            if let Some(notice) = &view.notice {
                let _ = writeln!(body, "<p role=\"alert\">{}</p>", escape_html(notice));
            }

            body.push_str("<h2>Add New Bookmark</h2>\n<form method=\"post\" action=\"/bookmarks\">\n");
            let _ = writeln!(
                body,
                "<label>Title <input type=\"text\" name=\"title\" placeholder=\"Website Name\" value=\"{}\" required></label>",
                escape_html(&view.form.title)
            );
            let _ = writeln!(
                body,
                "<label>URL <input type=\"url\" name=\"url\" placeholder=\"https://...\" value=\"{}\" required></label>",
                escape_html(&view.form.url)
            );
            let _ = writeln!(
                body,
                "<button type=\"submit\"{}>{}</button>\n</form>",
                if view.form.submit_disabled { " disabled" } else { "" },
                view.form.submit_label
            );

            match view.empty_message {
                Some(message) => {
                    let _ = writeln!(body, "<p>{message}</p>");
                }
                None => {
                    body.push_str("<ul>\n");
                    for item in &view.items {
                        let url = escape_html(&item.url);
                        let title = escape_html(&item.title);
                        // Rows written by other clients may carry any scheme.
                        let label = if is_web_url(&item.url) {
                            format!("<a href=\"{url}\" target=\"_blank\" rel=\"noopener noreferrer\">{title}</a>")
                        } else {
                            title
                        };
                        let _ = writeln!(
                            body,
                            "<li>{label} <small>{url}</small> <form method=\"post\" action=\"/bookmarks/{id}/delete\"><button type=\"submit\">Delete</button></form></li>",
                            id = item.id,
                        );
                    }
                    body.push_str("</ul>\n");
                }
            }
        }
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Bookmark Manager</title>\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

/// Renders a screen as plain text, one bookmark per line.
pub fn render_text(screen: &Screen) -> String {
    match screen {
        Screen::Loading => "Loading...\n".to_string(),
        Screen::SignIn { .. } => "Not signed in.\n".to_string(),
        Screen::Bookmarks(view) => {
            let mut out = format!("Logged in as: {}\n", view.email);
            if let Some(notice) = &view.notice {
                let _ = writeln!(out, "! {notice}");
            }
            match view.empty_message {
                Some(message) => {
                    let _ = writeln!(out, "{message}");
                }
                None => {
                    for item in &view.items {
                        let _ = writeln!(out, "{}  {}  {}", item.id, item.title, item.url);
                    }
                }
            }
            out
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
