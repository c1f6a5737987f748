//! Telegram transport for the conversation engine.
//!
//! Turns updates into [`Event`]s, runs them through [`Conversation`], saves
//! the new session and renders the replies. The bot only talks in private
//! chats, where the chat id equals the sender's user id.

use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use teloxide::prelude::*;
use teloxide::types::{BotCommand, InlineKeyboardButton, InlineKeyboardMarkup, LabeledPrice};

use plantwatch_core::UserStore;

use crate::config::BotSettings;
use crate::conversation::texts;
use crate::conversation::{CallbackAction, Command, Conversation, Event, Reply};
use crate::error::HandlerError;
use crate::payments::Invoice;
use crate::session::SessionStore;

type HandlerResult = Result<(), HandlerError>;

/// Shared state of all update handlers.
pub struct BotState {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub settings: BotSettings,
    pub payment_provider_token: SecretString,
    /// Chat that receives handler failure reports.
    pub admin_chat_id: Option<plantwatch_core::ChatId>,
}

/// Register the command menu and process updates until Ctrl-C.
///
/// # Errors
///
/// Returns the request error if the command menu cannot be registered.
pub async fn run(bot: Bot, state: Arc<BotState>) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(
        Command::ALL.map(|command| BotCommand::new(command.name(), command.description())),
    )
    .await?;

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback))
        .branch(Update::filter_pre_checkout_query().endpoint(on_pre_checkout));

    tracing::info!("Bot started, waiting for updates");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

async fn on_message(bot: Bot, msg: Message, state: Arc<BotState>) -> HandlerResult {
    let event = if let Some(payment) = msg.successful_payment() {
        Event::PaymentSucceeded {
            payload: payment.invoice_payload.clone(),
        }
    } else if let Some(text) = msg.text() {
        Event::from_text(text)
    } else {
        return Ok(());
    };

    let chat_id = msg.chat.id;
    let result = process(&bot, &state, chat_id, event).await;
    settle(&bot, &state, chat_id, result).await
}

async fn on_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some(action) = q.data.as_deref().and_then(CallbackAction::from_data) else {
        tracing::debug!(data = ?q.data, "Unknown callback data");
        return Ok(());
    };

    let chat_id = ChatId::from(q.from.id);
    let result = process(&bot, &state, chat_id, Event::Callback(action)).await;
    settle(&bot, &state, chat_id, result).await
}

async fn on_pre_checkout(bot: Bot, q: PreCheckoutQuery, state: Arc<BotState>) -> HandlerResult {
    let chat_id = ChatId::from(q.from.id);
    let event = Event::PreCheckout {
        payload: q.invoice_payload.clone(),
    };

    let replies = match run_conversation(&state, chat_id, event).await {
        Ok(replies) => replies,
        Err(e) => {
            // An unanswered query blocks the payment until it times out.
            bot.answer_pre_checkout_query(q.id, false)
                .error_message(texts::PAYMENT_REJECTED)
                .await?;
            return settle(&bot, &state, chat_id, Err(e)).await;
        }
    };

    for reply in replies {
        match reply {
            Reply::PreCheckout { ok, error_message } => {
                let answer = bot.answer_pre_checkout_query(q.id.clone(), ok);
                match error_message {
                    Some(message) => answer.error_message(message).await?,
                    None => answer.await?,
                };
            }
            other => send_reply(&bot, &state, chat_id, other).await?,
        }
    }
    Ok(())
}

/// Run the event and send every reply.
async fn process(bot: &Bot, state: &BotState, chat_id: ChatId, event: Event) -> HandlerResult {
    for reply in run_conversation(state, chat_id, event).await? {
        send_reply(bot, state, chat_id, reply).await?;
    }
    Ok(())
}

/// Run the event and persist the session if it changed.
///
/// On error the stored session is left as it was.
async fn run_conversation(
    state: &BotState,
    chat_id: ChatId,
    event: Event,
) -> Result<Vec<Reply>, HandlerError> {
    let chat = plantwatch_core::ChatId::new(chat_id.0);
    let session = state.sessions.load(chat).await?;

    let transition = Conversation::new(state.users.as_ref(), &state.settings)
        .handle(chat, &session, event, Utc::now().date_naive())
        .await?;

    if transition.session != session {
        state.sessions.save(chat, &transition.session).await?;
    }
    Ok(transition.replies)
}

async fn send_reply(bot: &Bot, state: &BotState, chat_id: ChatId, reply: Reply) -> HandlerResult {
    match reply {
        Reply::Text(text) => {
            bot.send_message(chat_id, text).await?;
        }
        Reply::Menu { text, rows } => {
            let keyboard = InlineKeyboardMarkup::new(rows.into_iter().map(|row| {
                row.into_iter()
                    .map(|button| InlineKeyboardButton::callback(button.label, button.action.data()))
                    .collect::<Vec<_>>()
            }));
            bot.send_message(chat_id, text).reply_markup(keyboard).await?;
        }
        Reply::Invoice(invoice) => send_invoice(bot, state, chat_id, invoice).await?,
        Reply::PreCheckout { .. } => {
            tracing::warn!(%chat_id, "Pre-checkout answer outside of a pre-checkout query");
        }
    }
    Ok(())
}

async fn send_invoice(bot: &Bot, state: &BotState, chat_id: ChatId, invoice: Invoice) -> HandlerResult {
    let amount = invoice.price.minor_units().ok_or(HandlerError::InvalidPrice)?;
    let prices = vec![LabeledPrice {
        label: invoice.label,
        amount,
    }];

    bot.send_invoice(
        chat_id,
        invoice.title,
        invoice.description,
        invoice.payload,
        invoice.price.currency.code(),
        prices,
    )
    .provider_token(state.payment_provider_token.expose_secret())
    .need_name(false)
    .need_email(false)
    .need_shipping_address(false)
    .is_flexible(false)
    .await?;
    Ok(())
}

/// Log a failed update, tell the user and report it to the admin chat.
///
/// Always succeeds so the dispatcher keeps going.
async fn settle(bot: &Bot, state: &BotState, chat_id: ChatId, result: HandlerResult) -> HandlerResult {
    let Err(e) = result else {
        return Ok(());
    };
    tracing::error!(%chat_id, error = %e, "Update handler failed");

    if let Err(send_err) = bot.send_message(chat_id, texts::HANDLER_FAILED).await {
        tracing::warn!(%chat_id, error = %send_err, "Cannot tell user about the failure");
    }
    if let Some(admin) = state.admin_chat_id {
        let report = format!("Update from chat {chat_id} caused an error:\n\n{e}");
        if let Err(send_err) = bot.send_message(ChatId(admin.get()), report).await {
            tracing::warn!(error = %send_err, "Cannot report failure to admin chat");
        }
    }
    Ok(())
}
