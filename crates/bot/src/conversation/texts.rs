//! User-facing texts.

use plantwatch_core::{Plan, PlanQuota, User};

use crate::config::BotSettings;

pub const CANCEL: &str = "Bye! I hope we can talk again some day.";
pub const UNKNOWN: &str =
    "Hmm, I don't know what to answer. Please run /help to see what I can do for you.";
pub const NOT_LINKED: &str =
    "Hmm, you haven't linked your account yet, so I don't know who you are. Please /link first.";
pub const UNLINK_NOT_LINKED: &str = "You can't unlink your account, if you haven't linked it yet :)";
pub const EXTEND_NOT_LINKED: &str = "You must first tell me who you are before you can extend your \
                                     account. Do that via /link.";
pub const LINKED_USER_MISSING: &str = "Something is wrong with the email address that you \
                                       entered. Please /unlink and /link again.";
pub const CONFIGURE_MENU: &str = "Which setting do you want to configure?";
pub const WISHLIST_NOT_ALLOWED: &str =
    "Wishlist is a paid feature. Enable it via /extendbasic or /extendpremium and try again.";
pub const AUTO_CHECKOUT_NOT_ALLOWED: &str =
    "Auto-checkout is a premium features. Enable it via /extendpremium and try again.";
pub const CONFIG_UPDATED: &str = "I have updated the configuration for you. Bye!";
pub const BYE: &str = "Bye!";
pub const WISHLIST_PROMPT: &str = "Enter/Modify your wish-list now or /cancel.";
pub const PREMIUM_QUOTA_HINT: &str = "Hint: If you switch to the premium plan (via /extendpremium) \
                                      you can add up to 6 items in your wish-list.";
pub const PAYMENT_REJECTED: &str = "Something went wrong...";
pub const PAYMENT_SUCCEEDED: &str = "Thank you for your payment!\n\
                                     The change has been updated in the database.\n\n\
                                     Check /userinfo for the latest service expiry date / premium status.";
pub const PAYMENT_FAILED: &str =
    "An error happened during database update. Please contact /support.";
pub const HANDLER_FAILED: &str =
    "Sorry, something went wrong on my side. Please try again later or ask for /support.";

pub fn start(settings: &BotSettings) -> String {
    format!(
        "Hi, I'm the {} Bot, Botti!\n\n\
         I can send out notifications when your favorite {} plants are available.\n\n\
         Get started by typing /link.",
        shop_title(&settings.shop_name),
        settings.shop_name
    )
}

pub fn help(settings: &BotSettings) -> String {
    format!(
        "I can listen to the following actions:\n\n\
         - /link - Link your Telegram account with your registered {} email, to receive notifications\n\
         - /unlink - Unlink your Telegram account to stop receiving notifications\n\
         - /configure - Configure settings (e.g. wish-list, auto-checkout)\n\
         - /userinfo - Show information about your user (name, service expiry date, registered email, etc.)\n\
         - /extendbasic - Extend service (basic plan)\n\
         - /extendpremium - Extend service (premium plan)\n\
         - /support - Get support\n\
         - /help - Show this help",
        settings.shop_name
    )
}

pub fn support(settings: &BotSettings) -> String {
    format!(
        "If you need any kind of support, write a message to {}",
        settings.support_handle
    )
}

pub fn already_linked(email: &str) -> String {
    format!(
        "You already told me your email address ({email}).\n\n\
         If you want to unlink your account from this Telegram service, please send me a text /unlink.\n\n\
         If you want to edit your email address, please /unlink and then /link again."
    )
}

pub fn link_prompt(settings: &BotSettings) -> String {
    format!(
        "To get notifications, I need to know your {} email address. Please type it now.\n\n\
         Hint: Type /cancel to abort the registration.",
        settings.shop_name
    )
}

pub fn email_missing_at(settings: &BotSettings) -> String {
    format!("Please enter your {} email address", settings.shop_name)
}

pub fn not_registered(settings: &BotSettings) -> String {
    format!(
        "Seems you have not registered your account yet. Please register first at: {}\n\n\
         If you have already registered via the website, please try linking (/link) again in 30 minutes.",
        settings.registration_url
    )
}

pub fn linked(real_name: &str) -> String {
    format!("Thank you, {real_name}! Please /configure your wish-list now, to get notifications :)")
}

pub fn unlinked(email: &str) -> String {
    format!(
        "Sad to see you leave!\n\n\
         I will unlink your email address ({email}) from this account now.\n\n\
         If you want to link your account again, please send me a text /link."
    )
}

pub fn user_info(user: &User) -> String {
    let expiry = user
        .expiry_date
        .map_or_else(|| "n.a.".to_owned(), |date| date.format("%Y-%m-%d").to_string());
    let plan = match user.config.plan {
        Plan::None => "n.a.",
        plan => plan.as_str(),
    };
    format!(
        "This is the information I got about you:\n\n\
         - Name: {}\n\
         - Service expiry date: {expiry}\n\
         - Registered email: {}\n\
         - Plan: {plan}\n\
         - Auto-checkout: {}\n\
         - Wish-list:\n\n{}\n\n\
         If any of the above data is wrong, please ask for /support.",
        user.real_name,
        user.email,
        if user.config.auto_checkout { "True" } else { "False" },
        user.config.wishlist.trim_end()
    )
}

pub fn wishlist_help(settings: &BotSettings, quota: &PlanQuota) -> String {
    format!(
        "Edit your {shop} bot wish-list.\n\n\
         Syntax: <item-id>;<quantity>\n\n\
         Hints:\n\
         - item-id can be retrieved from item URL on {shop} website\n\
         \u{20}\u{20}- Example 1 (Anthurium regale): www.{shop}/[..]/Products/PIE2081 -> PIE2081\n\
         \u{20}\u{20}- Example 2 (Anthurium luxurians): www.{shop}/[..]/ObjectID=471110 -> 471110\n\
         - Quantity is only relevant for auto-checkout feature (premium)\n\
         - Quantity can be empty (means bot will notify only)\n\
         - Quantity can not be more than {max_quantity}\n\
         - Wishlist can not exceed more than {basic} (basic) or {premium} (premium) items\n\
         - Send na to clear your wish-list\n\n\
         Your plan allows {max_items} items.\n\n\
         Example:\n\
         PIE2081;1\n\
         471110\n\n\
         Above example would\n\
         - Order one Anthurium regale\n\
         - Notify once Anthurium luxurians is available",
        shop = settings.shop_name,
        max_quantity = quota.max_quantity,
        basic = Plan::Basic.quota().max_items,
        premium = Plan::Premium.quota().max_items,
        max_items = quota.max_items,
    )
}

pub fn current_wishlist(wishlist: &str) -> String {
    let wishlist = wishlist.trim();
    if wishlist.is_empty() {
        "Current wish-list:\nempty".to_owned()
    } else {
        format!("Current wish-list:\n{wishlist}")
    }
}

pub fn auto_checkout_menu(enabled: bool) -> String {
    let current = if enabled {
        "A) Auto-checkout on"
    } else {
        "B) Auto-checkout off (default)"
    };
    format!(
        "Edit your auto-checkout setting (bot will try to checkout available plants from the \
         wish-list, in the specific quantity).\n\n\
         Hint: Please ensure that you have configured your billing & delivery address in the \
         shop website, else the auto-checkout will fail!\n\n\
         Current setting: {current}\n\n\
         Select your preferred option below:"
    )
}

pub fn too_many_items(plan: Plan, max: usize) -> String {
    match plan {
        Plan::Basic => format!(
            "The basic plan only allows a maximum of {max} items in the wish-list. Reduce and try again!"
        ),
        _ => format!(
            "You have exceeded the maximum of {max} items in the wish-list. Please reduce and try again!"
        ),
    }
}

pub fn wishlist_trimmed(plan: Plan, wishlist: &str) -> String {
    format!(
        "The {plan} plan allows {} items in the wish-list, so only the first ones are kept:\n\
         {wishlist}\n\nUse /configure to choose different items.",
        plan.quota().max_items
    )
}

pub fn invalid_line(line: &str) -> String {
    format!("Invalid format or quantity for line '{line}'. Try again!")
}

pub fn duplicate_item(item_id: &str) -> String {
    format!("Item '{item_id}' is mentioned multiple times. Try again!")
}

/// "ecuagenera.com" becomes "Ecuagenera".
fn shop_title(shop_name: &str) -> String {
    let base = shop_name.split('.').next().unwrap_or(shop_name);
    let mut chars = base.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use plantwatch_core::testing::UserBuilder;

    use super::*;

    #[test]
    fn test_start_uses_shop_title() {
        let text = start(&BotSettings::default());
        assert!(text.starts_with("Hi, I'm the Ecuagenera Bot, Botti!"));
    }

    #[test]
    fn test_user_info() {
        let user = UserBuilder::new(1, "grower@example.com")
            .real_name("Jane Grower")
            .plan(Plan::Premium)
            .auto_checkout(true)
            .wishlist("PIE2081;1\n471110\n")
            .expiry_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
            .build();
        let text = user_info(&user);
        assert!(text.contains("- Name: Jane Grower\n"));
        assert!(text.contains("- Service expiry date: 2024-06-01\n"));
        assert!(text.contains("- Plan: premium\n"));
        assert!(text.contains("- Auto-checkout: True\n"));
        assert!(text.contains("- Wish-list:\n\nPIE2081;1\n471110\n\n"));
    }

    #[test]
    fn test_user_info_without_plan() {
        let text = user_info(&UserBuilder::new(1, "grower@example.com").build());
        assert!(text.contains("- Plan: n.a.\n"));
        assert!(text.contains("- Service expiry date: n.a.\n"));
    }

    #[test]
    fn test_quota_messages() {
        assert_eq!(
            too_many_items(Plan::Basic, 3),
            "The basic plan only allows a maximum of 3 items in the wish-list. Reduce and try again!"
        );
        assert_eq!(
            too_many_items(Plan::Premium, 6),
            "You have exceeded the maximum of 6 items in the wish-list. Please reduce and try again!"
        );
    }
}
