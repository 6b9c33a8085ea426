use super::prelude::*;
use crate::protocol::commands::ext::Resume;

use crate::common::{Signal, Tid};
use crate::protocol::commands::_vCont::{vCont, Actions, VContKind};
use crate::protocol::IdKind;
use crate::server::core_impl::RangeStep;
use crate::session::pump::{self, ThreadFilter};
use crate::session::StopEvent;

/// What a resume packet asks for.
struct ResumeRequest {
    filter: ThreadFilter,
    addr: Option<u64>,
    step: Option<Tid>,
    reinject: Option<Signal>,
    range: Option<(Tid, u64, u64)>,
}

impl<C: Connection> GdbServerImpl<C> {
    pub(crate) fn handle_stop_resume<'a>(
        &mut self,
        target: &mut dyn Target,
        session: &mut DebugSession,
        res: &mut ResponseWriter<'_, C>,
        command: Resume<'a>,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let filter = match self.current_resume_tid {
            IdKind::WithId(tid) => ThreadFilter::Only(tid),
            IdKind::All | IdKind::Any => ThreadFilter::All,
        };

        let req = match command {
            Resume::vCont(vCont::Query) => {
                res.write_str("vCont;c;C;s;S;r")?;
                return Ok(HandlerStatus::Handled);
            }
            Resume::vCont(vCont::Actions(actions)) => self.parse_vcont(session, actions)?,
            Resume::c(cmd) => ResumeRequest {
                filter,
                addr: cmd.addr,
                step: None,
                reinject: None,
                range: None,
            },
            Resume::C(cmd) => ResumeRequest {
                filter,
                addr: cmd.addr,
                step: None,
                reinject: reinjected_signal(session, cmd.sig)?,
                range: None,
            },
            Resume::s(cmd) => ResumeRequest {
                filter,
                addr: cmd.addr,
                step: Some(self.step_thread(session)?),
                reinject: None,
                range: None,
            },
            Resume::S(cmd) => ResumeRequest {
                filter,
                addr: cmd.addr,
                step: Some(self.step_thread(session)?),
                reinject: reinjected_signal(session, cmd.sig)?,
                range: None,
            },
        };

        self.do_resume(target, session, req)
    }

    fn step_thread(&self, session: &DebugSession) -> Result<Tid, Error<C::Error>> {
        self.current_resume_tid
            .specific()
            .or_else(|| session.stopped_thread())
            .ok_or(Error::NonFatalError(errno::ESRCH))
    }

    fn parse_vcont(
        &self,
        session: &DebugSession,
        actions: Actions<'_>,
    ) -> Result<ResumeRequest, Error<C::Error>> {
        let mut filter = None;
        let mut step = None;
        let mut reinject = None;
        let mut range = None;

        for action in actions.iter() {
            let action = action.ok_or(Error::NonFatalError(errno::EINVAL))?;
            let tid = action.thread.and_then(|thread| thread.tid.specific());
            let target_tid = || -> Result<Tid, Error<C::Error>> {
                tid.or_else(|| session.stopped_thread())
                    .ok_or(Error::NonFatalError(errno::ESRCH))
            };

            match action.kind {
                // all-stop only: threads are never stopped individually
                VContKind::Stop => continue,
                VContKind::Continue => {}
                VContKind::ContinueWithSig(sig) => {
                    reinject = reinject.or(reinjected_signal(session, sig)?)
                }
                VContKind::Step => step = step.or(Some(target_tid()?)),
                VContKind::StepWithSig(sig) => {
                    step = step.or(Some(target_tid()?));
                    reinject = reinject.or(reinjected_signal(session, sig)?);
                }
                VContKind::RangeStep(start, end) => {
                    let tid = target_tid()?;
                    step = step.or(Some(tid));
                    range = range.or(Some((tid, start, end)));
                }
            }

            // an action without a thread applies to every remaining thread
            filter = match (filter, tid) {
                (_, None) => Some(ThreadFilter::All),
                (None, Some(tid)) => Some(ThreadFilter::Only(tid)),
                (Some(filter), Some(_)) => Some(filter),
            };
        }

        let filter = filter.ok_or(Error::NonFatalError(errno::EINVAL))?;
        Ok(ResumeRequest {
            filter,
            addr: None,
            step,
            reinject,
            range,
        })
    }

    fn do_resume(
        &mut self,
        target: &mut dyn Target,
        session: &mut DebugSession,
        req: ResumeRequest,
    ) -> Result<HandlerStatus, Error<C::Error>> {
        let process = session
            .current_process()
            .ok_or(Error::NonFatalError(errno::ESRCH))?;

        if let Some(addr) = req.addr {
            let tid = req
                .step
                .or_else(|| session.stopped_thread())
                .or_else(|| process.thread_ids().next())
                .ok_or(Error::NonFatalError(errno::ESRCH))?;
            let mut ctx = process.read_context(target, tid).handle_error()?;
            process.backend().set_pc(&mut ctx, addr).handle_error()?;
            process.write_context(target, tid, &ctx).handle_error()?;
        }

        self.qxfer.invalidate();
        self.last_triggered.clear();
        self.range_step = req.range.map(|(tid, start, end)| RangeStep {
            tid,
            start,
            end,
            filter: req.filter,
        });

        if let Err(e) = pump::resume(target, session, req.filter, req.step, req.reinject) {
            warn!("cannot resume: {}", e);
            self.range_step = None;
            return Err(Error::NonFatalError(errno::ESRCH));
        }
        Ok(HandlerStatus::Resumed)
    }
}

/// Signal 0 means "no signal". Any other signal must be the one the debuggee
/// stopped with.
fn reinjected_signal<E>(session: &DebugSession, sig: u8) -> Result<Option<Signal>, Error<E>> {
    if sig == 0 {
        return Ok(None);
    }
    match session.last_stop() {
        Some(StopEvent::Signal { signal, .. }) if signal.0 == sig => Ok(Some(*signal)),
        _ => {
            debug!("refusing to inject signal {} that was not raised", sig);
            Err(Error::NonFatalError(errno::EINVAL))
        }
    }
}
