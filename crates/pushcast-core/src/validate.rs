use crate::{Error, notification::PushNotification};

/// Maximum tokens FCM accepts in one multicast message.
pub const MAX_TOKENS: usize = 500;
/// Four weeks, the longest retention FCM honours.
pub const MAX_TIME_TO_LIVE: u32 = 2_419_200;

/// Structural checks run before a request is translated.
pub trait Validator: Send + Sync {
    fn validate(&self, request: &PushNotification) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestValidator;

impl Validator for RequestValidator {
    fn validate(&self, req: &PushNotification) -> Result<(), Error> {
        if req.tokens.is_empty() && req.to.is_empty() {
            return Err(Error::Validation(
                "the message must specify at least one registration ID",
            ));
        }

        if req.tokens.len() == 1 && req.tokens[0].is_empty() {
            return Err(Error::Validation("the token must not be empty"));
        }

        if req.tokens.len() > MAX_TOKENS {
            return Err(Error::Validation(
                "the message may specify at most 500 registration IDs",
            ));
        }

        if let Some(ttl) = req.time_to_live
            && ttl > MAX_TIME_TO_LIVE
        {
            return Err(Error::Validation(
                "the message's TimeToLive field must be an integer between 0 and 2419200 (4 weeks)",
            ));
        }

        Ok(())
    }
}
