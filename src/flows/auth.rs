//! Login and logout.
//!
//! Sign-in is a two-step exchange: the user sends their email, the platform
//! mails a one-time code, the user sends the code back. A failed code keeps
//! the exchange open so the user can retry or request a fresh code; only a
//! verified code plus a successful profile fetch produces a signed-in chat.

use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::bot::{keyboards, messaging};
use crate::flows::{guest_hint, report_api_error};
use crate::notify::NotifyBridge;
use crate::session::{AuthFlow, AuthUser, Session};
use crate::token::TokenStore;
use crate::validate;

/// Opens the login exchange by asking for an email.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn start_login(bot: &Bot, chat: ChatId, session: &mut Session) -> anyhow::Result<()> {
    if session.is_authenticated() {
        return messaging::send_html(
            bot,
            chat,
            "✅ You are already signed in. Use /logout first to switch accounts.",
        )
        .await;
    }

    session.reset_flows();
    session.auth_flow = Some(AuthFlow::default());
    messaging::send_html(
        bot,
        chat,
        "📧 Send the email address linked to your payout account.",
    )
    .await
}

/// Takes the email reply and requests a one-time code for it.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn handle_email(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
    text: &str,
) -> anyhow::Result<()> {
    let email = text.trim();
    if !validate::is_valid_email(email) {
        return messaging::send_html(
            bot,
            chat,
            "⚠️ That does not look like an email address. Try again.",
        )
        .await;
    }

    match api.request_otp(email).await {
        Ok(otp) => {
            session.auth_flow = Some(AuthFlow {
                email: Some(email.to_string()),
                sid: Some(otp.sid),
            });
            let text = format!(
                "📨 A one-time code is on its way to <b>{}</b>. Reply with the code to sign in.",
                html_escape::encode_text(email)
            );
            messaging::send_html(bot, chat, &text).await
        }
        Err(err) => {
            warn!("One-time code request failed for chat {chat}: {err}");
            // The flow stays on the email step so the user can retry
            messaging::send_html(bot, chat, &err.user_message()).await
        }
    }
}

/// Takes the code reply, verifies it and completes sign-in.
///
/// Verification alone is not enough: the profile fetch supplies the
/// organization id the push subscription needs, so sign-in only lands once
/// both calls succeed.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn handle_otp(
    bot: &Bot,
    api: &ApiClient,
    bridge: &NotifyBridge,
    chat: ChatId,
    session: &mut Session,
    text: &str,
) -> anyhow::Result<()> {
    let otp = text.trim();
    if !validate::is_valid_otp(otp) {
        return messaging::send_html(bot, chat, "⚠️ The code is digits only. Re-enter it.").await;
    }

    let Some((email, sid)) = session
        .auth_flow
        .as_ref()
        .and_then(|flow| Some((flow.email.clone()?, flow.sid.clone()?)))
    else {
        return messaging::send_html(bot, chat, "Use /login to start signing in.").await;
    };

    let auth = match api.verify_otp(&email, otp, &sid).await {
        Ok(auth) => auth,
        Err(err) => {
            // Stay on the code step; the user can retype or ask for a new code
            return messaging::send_html_with_markup(
                bot,
                chat,
                &otp_failure_message(&err),
                keyboards::login_retry_keyboard(),
            )
            .await;
        }
    };

    let mut tokens = TokenStore::new();
    tokens.set(auth.access_token, auth.expires_in);

    let profile = match api.profile(&mut tokens).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!("Profile fetch after sign-in failed for chat {chat}: {err}");
            session.auth_flow = None;
            let text = format!(
                "⚠️ The code was accepted, but your profile could not be loaded.\n{}\nUse /login to try again.",
                err.user_message()
            );
            return messaging::send_html(bot, chat, &text).await;
        }
    };

    session.auth_flow = None;
    let user = AuthUser::from_profile(profile, tokens);
    let organization = user.organization_id.clone();
    let token_snapshot = user.tokens.token().map(str::to_owned);
    let display = user.name.clone().unwrap_or_else(|| user.email.clone());
    session.user = Some(user);

    let welcome = format!(
        "✅ Signed in as <b>{}</b>.",
        html_escape::encode_text(&display)
    );
    messaging::send_html_with_markup(bot, chat, &welcome, keyboards::main_menu(true)).await?;

    // Advisory only; commands re-check verification where it matters
    if let Some(user) = session.user.as_mut() {
        match api.kyc_status(&mut user.tokens).await {
            Ok(status) if !status.is_approved() => {
                let text = format!(
                    "🪪 Verification status: <b>{status}</b>. Transfers unlock once verification is approved."
                );
                messaging::send_html(bot, chat, &text).await?;
            }
            Ok(_) => {}
            Err(err) => debug!("Verification check after sign-in failed: {err}"),
        }
    }

    if let Some(token) = token_snapshot {
        if !organization.is_empty() {
            bridge.arm(chat, &organization, token).await;
        }
    }
    Ok(())
}

/// Requests a fresh one-time code for the email already on file.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn resend_otp(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let Some(email) = session.auth_flow.as_ref().and_then(|flow| flow.email.clone()) else {
        return messaging::send_html(bot, chat, "Use /login to start signing in.").await;
    };

    match api.request_otp(&email).await {
        Ok(otp) => {
            session.auth_flow = Some(AuthFlow {
                email: Some(email),
                sid: Some(otp.sid),
            });
            messaging::send_html(bot, chat, "📨 A fresh code is on its way.").await
        }
        Err(err) => {
            warn!("One-time code resend failed for chat {chat}: {err}");
            messaging::send_html(bot, chat, &err.user_message()).await
        }
    }
}

/// Aborts the login exchange.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn cancel_login(bot: &Bot, chat: ChatId, session: &mut Session) -> anyhow::Result<()> {
    session.auth_flow = None;
    messaging::send_html_with_markup(
        bot,
        chat,
        "🚫 Sign-in cancelled.",
        keyboards::main_menu(session.is_authenticated()),
    )
    .await
}

/// Signs the chat out and drops everything remembered about the account.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn logout(
    bot: &Bot,
    bridge: &NotifyBridge,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    session.reset_flows();
    session.history = Default::default();

    let Some(user) = session.user.take() else {
        return messaging::send_html_with_markup(
            bot,
            chat,
            "You are not signed in.",
            keyboards::main_menu(false),
        )
        .await;
    };

    // Dropping `user` here discards the access token with it
    bridge.disarm(chat, &user.organization_id).await;
    messaging::send_html_with_markup(
        bot,
        chat,
        "👋 Signed out. Nothing about your account is kept on this chat.",
        keyboards::main_menu(false),
    )
    .await
}

/// Shows the signed-in account's profile, freshly fetched.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn show_profile(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let fetched = match session.user.as_mut() {
        Some(user) => api.profile(&mut user.tokens).await,
        None => return guest_hint(bot, chat).await,
    };

    match fetched {
        Ok(profile) => {
            let text = format!(
                "👤 <b>Profile</b>\nName: {}\nEmail: {}\nUser id: <code>{}</code>\nOrganization: <code>{}</code>",
                html_escape::encode_text(profile.name.as_deref().unwrap_or("—")),
                html_escape::encode_text(&profile.email),
                html_escape::encode_text(&profile.user_id),
                html_escape::encode_text(&profile.organization_id),
            );
            // Keep the cached identity in step with what the platform says
            if let Some(user) = session.user.as_mut() {
                user.email = profile.email;
                user.organization_id = profile.organization_id;
                user.name = profile.name;
            }
            messaging::send_html(bot, chat, &text).await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Shows the signed-in account's verification status.
///
/// # Errors
///
/// Returns an error when Telegram rejects the reply.
pub async fn show_kyc(
    bot: &Bot,
    api: &ApiClient,
    chat: ChatId,
    session: &mut Session,
) -> anyhow::Result<()> {
    let fetched = match session.user.as_mut() {
        Some(user) => api.kyc_status(&mut user.tokens).await,
        None => return guest_hint(bot, chat).await,
    };

    match fetched {
        Ok(status) => {
            let mut text = format!("🪪 Verification status: <b>{status}</b>.");
            if !status.is_approved() {
                text.push_str("\nTransfers, withdrawals and deposits unlock once verification is approved.");
            }
            messaging::send_html(bot, chat, &text).await
        }
        Err(err) => report_api_error(bot, chat, session, &err).await,
    }
}

/// Maps a code-verification failure to the message shown above the
/// retry buttons.
fn otp_failure_message(err: &ApiError) -> String {
    let detail = match err {
        ApiError::Unauthorized => return "❌ That code is not right. Check it and try again.".to_string(),
        ApiError::NotFound => {
            return "⚠️ This sign-in attempt is no longer valid. Request a new code.".to_string()
        }
        ApiError::RateLimited { .. } => {
            return "🚦 Too many attempts. Wait a moment, then request a new code.".to_string()
        }
        ApiError::Validation(message) | ApiError::Api { message, .. } => message.to_lowercase(),
        _ => return err.user_message(),
    };

    if detail.contains("expired") {
        "⌛ That code has expired. Request a new one.".to_string()
    } else if detail.contains("invalid") || detail.contains("incorrect") || detail.contains("wrong")
    {
        "❌ That code is not right. Check it and try again.".to_string()
    } else if detail.contains("session") || detail.contains("sid") || detail.contains("not found") {
        "⚠️ This sign-in attempt is no longer valid. Request a new code.".to_string()
    } else {
        err.user_message()
    }
}
