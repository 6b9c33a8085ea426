use super::prelude::*;
use crate::protocol::commands::ext::ThreadExtraInfo;

use crate::target::ext::thread_extra_info::{ThreadInfo, ThreadState};

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_thread_extra_info(
        &mut self,
        res: &mut ResponseWriter<'_, C>,
        target: &mut dyn Target,
        session: &mut DebugSession,
        command: ThreadExtraInfo,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let ThreadExtraInfo::qThreadExtraInfo(info) = command;

        let tid = info
            .thread
            .tid
            .specific()
            .ok_or(Error::NonFatalError(errno::EINVAL))?;
        let process = session
            .current_process()
            .ok_or(Error::NonFatalError(errno::ESRCH))?;
        let pid = process.pid();
        if process.thread(tid).is_none() {
            return Err(Error::NonFatalError(errno::ESRCH));
        }

        let text = match target.support_thread_extra_info() {
            Some(ops) => match ops.thread_info(pid, tid) {
                Ok(info) => describe(&info),
                Err(e) => {
                    debug!("no extra info for thread {}: {}", tid, e);
                    "No information".into()
                }
            },
            None => "No information".into(),
        };

        res.write_hex_buf(text.as_bytes())?;
        Ok(HandlerStatus::Handled)
    }
}

fn describe(info: &ThreadInfo) -> String {
    let mut text = match info.state {
        ThreadState::Running => "Running".to_string(),
        ThreadState::Suspended(n) if n > 1 => format!("Suspended ({})", n),
        ThreadState::Suspended(_) => "Suspended".to_string(),
        ThreadState::Terminated(code) => format!("Terminated (exit code = {})", code),
    };
    if let Some(priority) = info.priority {
        text.push_str(&format!(", priority = {}", priority));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions() {
        let info = |state, priority| describe(&ThreadInfo { state, priority });
        assert_eq!(info(ThreadState::Running, None), "Running");
        assert_eq!(info(ThreadState::Suspended(1), Some(0)), "Suspended, priority = 0");
        assert_eq!(info(ThreadState::Suspended(3), None), "Suspended (3)");
        assert_eq!(
            info(ThreadState::Terminated(1), Some(-2)),
            "Terminated (exit code = 1), priority = -2"
        );
    }
}
