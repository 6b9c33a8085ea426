use super::prelude::*;
use crate::protocol::commands::ext::NoAckMode;

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_no_ack_mode(
        &mut self,
        command: NoAckMode,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        if !self.no_ack_allowed {
            return Ok(HandlerStatus::Handled);
        }

        let handler_status = match command {
            NoAckMode::QStartNoAckMode(_) => {
                self.features.set_no_ack_mode(true);
                HandlerStatus::NeedsOk
            }
        };
        Ok(handler_status)
    }
}
