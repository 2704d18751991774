//! Link status state machines: check valves, pumps running off the end of
//! their curves, and the PRV/PSV/FCV setpoint logic. Each function maps a
//! current status plus the latest heads/flow to the next status; the solver
//! re-iterates whenever any status changes.

use super::coeffs::{HTOL, QTOL};
use crate::network::element::Status;

/// A check valve closes against reverse head or reverse flow.
pub(crate) fn cv_status(current: Status, dh: f64, q: f64) -> Status {
    if dh < -HTOL {
        return Status::Closed;
    }
    if q < -QTOL {
        return Status::Closed;
    }
    if current == Status::Closed && dh > HTOL {
        return Status::Open;
    }
    current
}

/// Pump status from the head rise it is being asked to supply. `hdrop` is
/// `h1 - h2` (negative when the pump lifts head downstream); `hmax` is the
/// shutoff head at the current speed.
pub(crate) fn pump_status(current: Status, hdrop: f64, hmax: f64, q: f64, qmax: f64) -> Status {
    if -hdrop > hmax + HTOL {
        return Status::XHead;
    }
    if qmax > 0.0 && q > qmax + QTOL {
        return Status::XFlow;
    }
    if matches!(current, Status::XHead | Status::XFlow) {
        // Conditions cleared: back in normal operation.
        return Status::Open;
    }
    current
}

/// PRV state machine. `hset` is the absolute downstream head setting.
pub(crate) fn prv_status(current: Status, hset: f64, h1: f64, h2: f64, q: f64) -> Status {
    match current {
        Status::Active => {
            if q < -QTOL {
                Status::Closed
            } else if h1 < hset - HTOL {
                Status::Open
            } else {
                Status::Active
            }
        }
        Status::Open => {
            if q < -QTOL {
                Status::Closed
            } else if h2 >= hset + HTOL {
                Status::Active
            } else {
                Status::Open
            }
        }
        _ => {
            if h1 >= hset + HTOL && h2 < hset - HTOL {
                Status::Active
            } else if h1 < hset - HTOL && h1 > h2 + HTOL {
                Status::Open
            } else {
                Status::Closed
            }
        }
    }
}

/// PSV state machine. `hset` is the absolute upstream head setting.
pub(crate) fn psv_status(current: Status, hset: f64, h1: f64, h2: f64, q: f64) -> Status {
    match current {
        Status::Active => {
            if q < -QTOL {
                Status::Closed
            } else if h2 > hset + HTOL {
                Status::Open
            } else {
                Status::Active
            }
        }
        Status::Open => {
            if q < -QTOL {
                Status::Closed
            } else if h1 < hset - HTOL {
                Status::Active
            } else {
                Status::Open
            }
        }
        _ => {
            if h2 < hset - HTOL && h1 > h2 + HTOL {
                Status::Open
            } else if h1 >= hset + HTOL && h1 > h2 + HTOL {
                Status::Active
            } else {
                Status::Closed
            }
        }
    }
}

/// FCV status: reverts to an open pipe (XFCV) when it cannot supply its flow
/// setting, reactivating once the flow would exceed the setting again.
pub(crate) fn fcv_status(current: Status, h1: f64, h2: f64, q: f64, setting: f64) -> Status {
    if h1 - h2 < -HTOL {
        return Status::XFcv;
    }
    if q < -QTOL {
        return Status::XFcv;
    }
    if current == Status::XFcv && q >= setting {
        return Status::Active;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cv_closes_on_reverse_head() {
        assert_eq!(cv_status(Status::Open, -1.0, 0.5), Status::Closed);
        assert_eq!(cv_status(Status::Open, 1.0, 0.5), Status::Open);
        assert_eq!(cv_status(Status::Closed, 1.0, 0.0), Status::Open);
    }

    #[test]
    fn pump_sheds_to_xhead_and_recovers() {
        // Required lift above shutoff head.
        assert_eq!(pump_status(Status::Open, -120.0, 100.0, 1.0, 10.0), Status::XHead);
        // Head demand eased: reopen.
        assert_eq!(pump_status(Status::XHead, -80.0, 100.0, 1.0, 10.0), Status::Open);
        // Flow beyond end of curve.
        assert_eq!(pump_status(Status::Open, -50.0, 100.0, 20.0, 10.0), Status::XFlow);
    }

    #[test]
    fn prv_activates_between_open_and_closed() {
        // Upstream above setting, downstream below: regulate.
        assert_eq!(prv_status(Status::Closed, 50.0, 80.0, 40.0, 0.0), Status::Active);
        // Upstream below setting with forward gradient: fully open.
        assert_eq!(prv_status(Status::Closed, 50.0, 45.0, 40.0, 0.0), Status::Open);
        // Reverse flow closes.
        assert_eq!(prv_status(Status::Active, 50.0, 80.0, 40.0, -1.0), Status::Closed);
    }
}
