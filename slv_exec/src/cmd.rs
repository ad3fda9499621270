//! # Command processor
//!
//! Implements the solver's control protocol. A request is a bottle headed by a command, `get` and
//! `set` are followed by a property and its value. Every reply starts with `ack` or `nack`, and
//! every command but `configure` is refused until the solver has been configured.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;
use log::{info, warn};
use comms_if::slv::{
    find_option, format_bottle, help_string, Command, PoseMode, Property, Reply, Switch,
    TrackMode, Value,
};

use crate::solver::{CartesianSolver, SolverOptions};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct CommandProcessor {
    solver: Arc<CartesianSolver>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommandProcessor {
    pub fn new(solver: Arc<CartesianSolver>) -> Self {
        Self { solver }
    }

    pub fn solver(&self) -> &Arc<CartesianSolver> {
        &self.solver
    }

    /// Process a request and build its reply.
    pub fn respond(&self, cmd: &[Value]) -> Vec<Value> {
        let command = match cmd.first().and_then(Value::as_str).map(str::parse::<Command>) {
            Some(Ok(c)) => c,
            _ => return nack()
        };

        if !self.solver.is_configured() && command != Command::Configure {
            return nack();
        }

        match command {
            Command::Help => vec![Reply::Ack.as_str().into(), help_string().into()],
            Command::Suspend => {
                self.solver.suspend();
                ack()
            },
            Command::Run => {
                if self.solver.run() {
                    ack()
                } else {
                    nack()
                }
            },
            Command::Quit => {
                self.solver.close();
                ack()
            },
            Command::Get => self.get(cmd),
            Command::Set => self.set(cmd),
            Command::Ask => self.ask(cmd),
            Command::Configure => self.configure(cmd),
        }
    }

    fn get(&self, cmd: &[Value]) -> Vec<Value> {
        let slv = &self.solver;

        let prop = match property(cmd) {
            Some(p) => p,
            None => return nack()
        };

        let payload: Option<Vec<Value>> = match prop {
            Property::Pose => Some(vec![slv.pose().as_str().into()]),
            Property::Mode => Some(vec![slv.mode().as_str().into()]),
            Property::JointLimit => cmd.get(2)
                .and_then(Value::as_i64)
                .filter(|a| *a >= 0)
                .and_then(|a| slv.joint_limits(a as usize))
                .map(|(min, max)| vec![min.into(), max.into()]),
            Property::Verbosity => slv.verbosity()
                .map(|v| vec![if v { Switch::On } else { Switch::Off }.as_str().into()]),
            Property::Dof => slv.dof()
                .map(|d| vec![Value::List(d.into_iter().map(Value::Int).collect())]),
            Property::RestPosition => slv.rest_pos().map(|r| vec![Value::from_f64_slice(&r)]),
            Property::RestWeights => slv.rest_weights().map(|r| vec![Value::from_f64_slice(&r)]),
            Property::TipFrame => slv.tip_frame().map(|t| vec![Value::from_f64_slice(&t)]),
            Property::SecondTask => slv.second_task().map(|t| vec![Value::List(vec![
                Value::Int(t.link),
                Value::from_f64_slice(&t.xd),
                Value::from_f64_slice(&t.w),
            ])]),
            _ => None
        };

        with_ack(payload)
    }

    fn set(&self, cmd: &[Value]) -> Vec<Value> {
        let slv = &self.solver;

        let (prop, value) = match (property(cmd), cmd.get(2)) {
            (Some(p), Some(v)) => (p, v),
            _ => return nack()
        };

        let payload: Option<Vec<Value>> = match prop {
            Property::Pose => value.as_str().and_then(|s| s.parse::<PoseMode>().ok()).map(|p| {
                slv.set_pose(p);
                vec![]
            }),
            Property::Mode => value.as_str().and_then(|s| s.parse::<TrackMode>().ok()).map(|m| {
                slv.set_mode(m);
                vec![]
            }),
            Property::JointLimit => {
                let axis = value.as_i64().filter(|a| *a >= 0);
                let min = cmd.get(3).and_then(Value::as_f64);
                let max = cmd.get(4).and_then(Value::as_f64);

                match (axis, min, max) {
                    (Some(a), Some(min), Some(max))
                        if slv.set_joint_limits(a as usize, min, max) => Some(vec![]),
                    _ => None
                }
            },
            Property::Verbosity => match value.as_str().and_then(|s| s.parse::<Switch>().ok()) {
                Some(s) if slv.set_verbosity(s == Switch::On) => Some(vec![]),
                _ => None
            },
            Property::Dof => value.as_f64_vec()
                .and_then(|d| slv.set_dof(&d))
                .map(|d| vec![Value::List(d.into_iter().map(Value::Int).collect())]),
            Property::RestPosition => value.as_f64_vec()
                .and_then(|r| slv.set_rest_pos(&r))
                .map(|r| vec![Value::from_f64_slice(&r)]),
            Property::RestWeights => value.as_f64_vec()
                .and_then(|r| slv.set_rest_weights(&r))
                .map(|r| vec![Value::from_f64_slice(&r)]),
            Property::TipFrame => match value.as_f64_vec() {
                Some(t) if slv.set_tip_frame(&t) => Some(vec![]),
                _ => None
            },
            Property::SecondTask => {
                let parts = value.as_list().unwrap_or(&[]);
                let link = parts.get(0).and_then(Value::as_i64);
                let xd = parts.get(1).and_then(Value::as_f64_vec);
                let w = parts.get(2).and_then(Value::as_f64_vec);

                match (link, xd, w) {
                    (Some(n), Some(xd), Some(w)) if slv.set_second_task(n, &xd, &w) => {
                        Some(vec![])
                    },
                    _ => None
                }
            },
            _ => None
        };

        with_ack(payload)
    }

    fn ask(&self, cmd: &[Value]) -> Vec<Value> {
        let xd = match find_option(cmd, Property::Xd.as_str()).and_then(|v| v.as_f64_vec()) {
            Some(xd) => xd,
            None => return nack()
        };

        let q0 = find_option(cmd, Property::Q.as_str()).and_then(|v| v.as_f64_vec());
        let pose = find_option(cmd, Property::Pose.as_str())
            .and_then(|v| v.as_str().and_then(|s| s.parse::<PoseMode>().ok()));

        match self.solver.ask(&xd, q0.as_deref(), pose) {
            Some(out) => vec![
                Reply::Ack.as_str().into(),
                Value::vector_option(Property::X.as_str(), &out.x),
                Value::vector_option(Property::Q.as_str(), &out.q),
            ],
            None => nack()
        }
    }

    fn configure(&self, cmd: &[Value]) -> Vec<Value> {
        let options = &cmd[1..];
        info!("Configuring with options: {}", format_bottle(options));

        let options = match SolverOptions::from_bottle(options) {
            Ok(o) => o,
            Err(e) => {
                warn!("Invalid configuration: {}", e);
                return nack();
            }
        };

        match self.solver.open(&options) {
            Ok(()) => ack(),
            Err(e) => {
                warn!("Could not configure {}: {}", self.solver.name(), e);
                nack()
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn ack() -> Vec<Value> {
    vec![Reply::Ack.as_str().into()]
}

fn nack() -> Vec<Value> {
    vec![Reply::Nack.as_str().into()]
}

fn with_ack(payload: Option<Vec<Value>>) -> Vec<Value> {
    match payload {
        Some(p) => {
            let mut reply = ack();
            reply.extend(p);
            reply
        },
        None => nack()
    }
}

fn property(cmd: &[Value]) -> Option<Property> {
    cmd.get(1).and_then(Value::as_str).and_then(|s| s.parse().ok())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::slv::parse_bottle;
    use util::maths::approx_eq;
    use crate::{
        device::sim::SimContext, output::SolutionBuffer, part_desc::LimbVariant,
    };

    fn processor() -> (Arc<SimContext>, CommandProcessor) {
        let ctx = Arc::new(SimContext::icub("icub"));
        let slv = CartesianSolver::new(
            "slv",
            LimbVariant::Arm,
            ctx.clone(),
            Arc::new(SolutionBuffer::new())
        );
        (ctx, CommandProcessor::new(Arc::new(slv)))
    }

    fn send(p: &CommandProcessor, text: &str) -> Vec<Value> {
        p.respond(&parse_bottle(text).unwrap())
    }

    fn configured() -> (Arc<SimContext>, CommandProcessor) {
        let (ctx, p) = processor();
        assert_eq!(send(&p, "cfg (type right)"), ack());
        assert_eq!(send(&p, "susp"), ack());
        (ctx, p)
    }

    #[test]
    fn test_refused_before_configure() {
        let (_, p) = processor();

        for c in ["help", "get dof", "set pose xyz", "ask (xd (0 0 0))", "run", "quit"].iter() {
            assert_eq!(send(&p, c), nack(), "{}", c);
        }
        assert_eq!(send(&p, ""), nack());
        assert_eq!(send(&p, "dance"), nack());
    }

    #[test]
    fn test_configure_twice() {
        let (ctx, p) = processor();
        assert_eq!(send(&p, "configure (pose xyz) (mode track)"), ack());
        let opens = ctx.num_opens();

        assert_eq!(send(&p, "configure"), ack());
        assert_eq!(ctx.num_opens(), opens);

        assert_eq!(send(&p, "get pose"), vec![Value::from("ack"), Value::from("xyz")]);
        assert_eq!(send(&p, "get mode"), vec![Value::from("ack"), Value::from("track")]);
    }

    #[test]
    fn test_invalid_configure() {
        let (_, p) = processor();
        assert_eq!(send(&p, "cfg (pose sideways)"), nack());
        assert!(!p.solver().is_configured());
    }

    #[test]
    fn test_help() {
        let (_, p) = configured();
        let reply = send(&p, "help");
        assert_eq!(reply[0], Value::from("ack"));
        assert!(reply[1].as_str().unwrap().starts_with("commands={help, suspend"));
    }

    #[test]
    fn test_unknown_property() {
        let (_, p) = configured();
        assert_eq!(send(&p, "get colour"), nack());
        assert_eq!(send(&p, "get"), nack());
        assert_eq!(send(&p, "set dof"), nack());
        assert_eq!(send(&p, "get xd"), nack());
        assert_eq!(send(&p, "set pose sideways"), nack());
    }

    #[test]
    fn test_dof() {
        let (_, p) = configured();

        let reply = send(&p, "get dof");
        assert_eq!(reply[0], Value::from("ack"));
        assert_eq!(reply[1].as_list().unwrap().len(), 10);

        let reply = send(&p, "set dof (1 1 1 1 1 1 1)");
        assert_eq!(reply[0], Value::from("ack"));
        assert_eq!(reply[1], Value::List(vec![Value::Int(1); 10]));

        // Shoulder must be all on or all off
        let reply = send(&p, "set dof (1 1 1 0 1 1 1)");
        assert_eq!(reply[1], Value::List(vec![Value::Int(1); 10]));
    }

    #[test]
    fn test_joint_limits() {
        let (_, p) = configured();

        let reply = send(&p, "get lim 6");
        assert_eq!(reply.len(), 3);
        assert!(approx_eq(reply[1].as_f64().unwrap(), 5.5, 1e-9));

        assert_eq!(send(&p, "set lim 6 10 90"), ack());
        let reply = send(&p, "get joint-limit 6");
        assert!(approx_eq(reply[1].as_f64().unwrap(), 10.0, 1e-9));
        assert!(approx_eq(reply[2].as_f64().unwrap(), 90.0, 1e-9));

        assert_eq!(send(&p, "set lim 6 0 90"), nack());

        // Fractional axes are refused, not truncated
        assert_eq!(send(&p, "set lim 6.7 20 80"), nack());
        assert_eq!(send(&p, "get lim 6.5"), nack());
        let reply = send(&p, "get lim 6");
        assert!(approx_eq(reply[1].as_f64().unwrap(), 10.0, 1e-9));
        assert_eq!(send(&p, "set lim 6 10"), nack());
        assert_eq!(send(&p, "get lim 10"), nack());
        assert_eq!(send(&p, "get lim -1"), nack());
        assert_eq!(send(&p, "get lim"), nack());
    }

    #[test]
    fn test_verbosity() {
        let (_, p) = configured();

        assert_eq!(send(&p, "set verbosity on"), ack());
        assert_eq!(send(&p, "get verb"), vec![Value::from("ack"), Value::from("on")]);
        assert_eq!(send(&p, "set verb off"), ack());
        assert_eq!(send(&p, "get verb"), vec![Value::from("ack"), Value::from("off")]);
        assert_eq!(send(&p, "set verb loud"), nack());
    }

    #[test]
    fn test_rest() {
        let (_, p) = configured();

        let reply = send(&p, "set rest_weights (1 2)");
        assert_eq!(reply[0], Value::from("ack"));
        let w = reply[1].as_f64_vec().unwrap();
        assert_eq!(w.len(), 10);
        assert_eq!(&w[..3], &[1.0, 2.0, 0.0]);

        // Later updates with fewer entries leave the rest unchanged
        let reply = send(&p, "set rest-weights (3)");
        assert_eq!(&reply[1].as_f64_vec().unwrap()[..3], &[3.0, 2.0, 0.0]);

        let reply = send(&p, "get rest-position");
        assert_eq!(reply[1].as_f64_vec().unwrap().len(), 10);
    }

    #[test]
    fn test_tip_and_second_task() {
        let (_, p) = configured();

        assert_eq!(send(&p, "set tip (0.1 0 0 0 0 1 0)"), ack());
        assert_eq!(send(&p, "set tip (0.1 0 0)"), nack());
        let reply = send(&p, "get tip");
        assert!((reply[1].as_f64_vec().unwrap()[0] - 0.1).abs() < 1e-12);

        let reply = send(&p, "get task2");
        assert_eq!(reply[1], Value::List(vec![
            Value::Int(6),
            Value::from_f64_slice(&[0.0, 0.0, -1.0]),
            Value::from_f64_slice(&[0.0, 0.0, 1.0]),
        ]));

        assert_eq!(send(&p, "set task2 (-1 (0 0 0) (0 0 0))"), ack());
        let reply = send(&p, "get second-task");
        assert_eq!(reply[1].as_list().unwrap()[0], Value::Int(-1));

        assert_eq!(send(&p, "set task2 (4 (0 0) (0 0 0))"), nack());
    }

    #[test]
    fn test_ask() {
        let (_, p) = configured();

        assert_eq!(send(&p, "ask"), nack());
        assert_eq!(send(&p, "ask (xd (0.1 0.2))"), nack());

        let x0 = p.solver().input().get_xd();
        let text = format!("ask (xd ({} {} {})) (pose xyz)", x0[0] + 0.01, x0[1], x0[2]);
        let reply = send(&p, &text);

        assert_eq!(reply[0], Value::from("ack"));
        assert_eq!(find_option(&reply, "x").unwrap().as_f64_vec().unwrap().len(), 7);
        assert_eq!(find_option(&reply, "q").unwrap().as_f64_vec().unwrap().len(), 10);

        // Starting from given joints
        let reply = send(&p, &format!("{} (q (-30 30 0 45 0 0 0))", text));
        assert_eq!(reply[0], Value::from("ack"));
    }

    #[test]
    fn test_quit() {
        let (_, p) = configured();

        assert_eq!(send(&p, "quit"), ack());
        assert!(p.solver().is_closed());
        assert_eq!(send(&p, "get dof"), nack());
        assert_eq!(send(&p, "cfg"), nack());
    }

    #[test]
    fn test_suspend_run() {
        let (_, p) = configured();
        assert!(p.solver().is_suspended());
        assert_eq!(send(&p, "run"), ack());
        assert!(!p.solver().is_suspended());
        assert_eq!(send(&p, "suspend"), ack());
        assert!(p.solver().is_suspended());
    }
}
