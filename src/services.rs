//! Pause/resume of the external services that hold the storage file open.
//!
//! The backup cycle never invokes process management directly; it goes
//! through this capability so tests can substitute a fake.

use std::process::Command;

use crate::error::ServiceControlError;

pub type ServiceResult = Result<(), ServiceControlError>;

/// Per-name results: a failure for one service never short-circuits the rest.
pub trait ServiceController: Send + Sync {
    fn pause(&self, services: &[String]) -> Vec<(String, ServiceResult)>;
    fn resume(&self, services: &[String]) -> Vec<(String, ServiceResult)>;
}

/// Controls systemd units via `systemctl stop`/`systemctl start`.
pub struct SystemdServiceController;

impl SystemdServiceController {
    fn run(&self, action: &str, services: &[String]) -> Vec<(String, ServiceResult)> {
        services
            .iter()
            .map(|service| {
                let outcome = match Command::new("systemctl").arg(action).arg(service).status() {
                    Ok(status) if status.success() => Ok(()),
                    Ok(status) => Err(ServiceControlError::Failed {
                        service: service.clone(),
                        action: action.to_string(),
                        status,
                    }),
                    Err(source) => Err(ServiceControlError::Spawn {
                        service: service.clone(),
                        action: action.to_string(),
                        source,
                    }),
                };
                (service.clone(), outcome)
            })
            .collect()
    }
}

impl ServiceController for SystemdServiceController {
    fn pause(&self, services: &[String]) -> Vec<(String, ServiceResult)> {
        self.run("stop", services)
    }

    fn resume(&self, services: &[String]) -> Vec<(String, ServiceResult)> {
        self.run("start", services)
    }
}
