//! Service manager
//!
//! Parses the configured service set, loads each service's entry point, and
//! drives every service through init → start → stop. On any shutdown path,
//! orderly or failure-induced, every registered service is stopped and its
//! artifact released after the instance.

mod compose;

use std::sync::Arc;

use crate::communicator::Communicator;
use crate::loader::{Artifact, ArtifactLoader, DynamicLoader, FactoryError};
use crate::service::{Service, ServiceState};

const SERVICE_PREFIX: &str = "IceBox.Service.";

/// The single user-visible failure category. `reason` carries the full
/// diagnostic, prefixed with the operation that produced it.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct Failure {
    pub reason: String,
}

impl Failure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One configured service: `IceBox.Service.<name> = <entryPoint> [arg …]`.
///
/// The value is tokenized on runs of space, tab, and newline; the first token
/// is the entry point and the rest are the service's arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub entry_point: String,
    pub args: Vec<String>,
}

impl ServiceDescriptor {
    pub fn parse(name: &str, value: &str) -> Self {
        let mut tokens = value
            .split(|c| c == ' ' || c == '\t' || c == '\n')
            .filter(|t| !t.is_empty());
        let entry_point = tokens.next().unwrap_or("").to_string();
        let args = tokens.map(str::to_string).collect();
        Self {
            name: name.to_string(),
            entry_point,
            args,
        }
    }
}

/// Registry entry binding a service name to its live instance and the
/// artifact that backs it.
struct ServiceRecord {
    name: String,
    state: ServiceState,
    // `instance` is declared before `artifact`: drop order releases the
    // service before its code is unmapped.
    instance: Box<dyn Service>,
    artifact: Option<Artifact>,
}

/// Orchestrates the configured service set and exposes the administrative
/// shutdown operation through the container's object adapter.
pub struct ServiceManager {
    communicator: Arc<Communicator>,
    program_name: String,
    argv: Vec<String>,
    /// Options the runtime recognized at startup, snapshot at construction.
    options: Vec<String>,
    /// Insertion order is start order; stopAll drains from the front.
    services: Vec<ServiceRecord>,
    loader: Box<dyn ArtifactLoader>,
}

impl ServiceManager {
    pub fn new(communicator: Arc<Communicator>, program_name: String, args: Vec<String>) -> Self {
        Self::with_loader(communicator, program_name, args, Box::new(DynamicLoader))
    }

    /// Construct with a custom entry-point loader, for hosts that resolve
    /// services in-process.
    pub fn with_loader(
        communicator: Arc<Communicator>,
        program_name: String,
        args: Vec<String>,
        loader: Box<dyn ArtifactLoader>,
    ) -> Self {
        let options = communicator.properties().command_line_options();
        Self {
            communicator,
            program_name,
            argv: args,
            options,
            services: Vec::new(),
            loader,
        }
    }

    /// Run the container to completion: initialize and start every configured
    /// service, serve the administrative endpoint, block until shutdown, then
    /// stop everything. Returns the process exit code.
    pub async fn run(&mut self) -> i32 {
        match self.run_inner().await {
            Ok(()) => 0,
            Err(failure) => {
                log::error!("{}", failure.reason);
                self.stop_all();
                1
            }
        }
    }

    async fn run_inner(&mut self) -> Result<(), Failure> {
        // The admin endpoint gets its own adapter; services should not share
        // it, since these endpoints will usually be firewalled.
        let adapter = self
            .communicator
            .create_object_adapter_from_property(
                "ServiceManagerAdapter",
                "IceBox.ServiceManager.Endpoints",
            )
            .await
            .map_err(|e| Failure::new(format!("ServiceManager: {}", e)))?;

        let configured = self
            .communicator
            .properties()
            .properties_for_prefix(SERVICE_PREFIX);
        log::info!(
            "{}: loading {} configured services",
            self.program_name,
            configured.len()
        );

        for (key, value) in &configured {
            let descriptor = ServiceDescriptor::parse(&key[SERVICE_PREFIX.len()..], value);
            self.init_service(&descriptor.name, &descriptor.entry_point, &descriptor.args)?;
        }

        self.start_all()?;

        // Lets external scripts wait for the container to come up: the value
        // of IceBox.PrintServicesReady is echoed back with " ready" appended,
        // after every start and before any request is dispatched.
        let bundle = self
            .communicator
            .properties()
            .get("IceBox.PrintServicesReady")
            .to_string();
        if !bundle.is_empty() {
            println!("{} ready", bundle);
        }

        adapter.activate(Arc::clone(&self.communicator));

        self.communicator.wait_for_shutdown().await;

        self.stop_all();
        Ok(())
    }

    /// Compose the service's configuration, load its entry point, invoke the
    /// factory, and initialize the instance. On success the service enters
    /// the registry in state `Initialized`.
    pub fn init_service(
        &mut self,
        name: &str,
        entry_point: &str,
        args: &[String],
    ) -> Result<(), Failure> {
        // Registry names are unique; reject the duplicate before any
        // artifact is loaded.
        if self.find(name).is_some() {
            return Err(Failure::new(format!(
                "ServiceManager: service {} is already registered",
                name
            )));
        }

        let (service_properties, service_args) =
            compose::compose_service_config(name, args, &self.options, &self.argv)?;

        let entry = self.loader.load_entry_point(entry_point).map_err(|e| {
            let message = e.to_string();
            let mut reason = format!(
                "ServiceManager: unable to load entry point '{}'",
                entry_point
            );
            if !message.is_empty() {
                reason.push_str(": ");
                reason.push_str(&message);
            }
            Failure::new(reason)
        })?;

        let mut instance = match entry.instantiate(&self.communicator) {
            Ok(instance) => instance,
            Err(FactoryError::Failed(e)) => {
                return Err(Failure::new(format!(
                    "ServiceManager: exception in entry point '{}': {}",
                    entry_point, e
                )))
            }
            Err(FactoryError::Unknown) => {
                return Err(Failure::new(format!(
                    "ServiceManager: unknown exception in entry point '{}'",
                    entry_point
                )))
            }
        };

        if let Err(e) = instance.init(
            name,
            Arc::clone(&self.communicator),
            service_properties,
            service_args,
        ) {
            // A Failure raised by the service itself passes through
            // untranslated.
            return Err(match e.downcast::<Failure>() {
                Ok(failure) => *failure,
                Err(e) => Failure::new(format!(
                    "ServiceManager: exception while initializing service {}: {}",
                    name, e
                )),
            });
        }

        log::info!("initialized service {}", name);
        self.services.push(ServiceRecord {
            name: name.to_string(),
            state: ServiceState::Initialized,
            instance,
            artifact: entry.into_artifact(),
        });
        Ok(())
    }

    /// Start every registered service in registration order.
    ///
    /// On the first failure the failed service and everything after it leave
    /// the registry without a `stop` call; services started before the
    /// failure stay registered so the caller's cleanup can stop them.
    pub fn start_all(&mut self) -> Result<(), Failure> {
        for index in 0..self.services.len() {
            let record = &mut self.services[index];
            if let Err(e) = record.instance.start() {
                record.state = ServiceState::Failed;
                let failure = match e.downcast::<Failure>() {
                    Ok(failure) => *failure,
                    Err(e) => Failure::new(format!(
                        "ServiceManager: exception in start for service {}: {}",
                        record.name, e
                    )),
                };
                self.services.truncate(index);
                return Err(failure);
            }
            record.state = ServiceState::Started;
            log::info!("started service {}", record.name);
        }
        Ok(())
    }

    /// Stop one service and drop its record.
    ///
    /// The record leaves the registry before `stop` runs, so a re-entrant
    /// stopAll cannot reach the same service twice. The caller must only name
    /// a registered service.
    pub fn stop(&mut self, name: &str) -> Result<(), Failure> {
        let index = self
            .find(name)
            .expect("stop target must be present in the registry");
        let mut record = self.services.remove(index);

        let result = record.instance.stop();
        // Dropping the record here releases the instance, then the artifact.
        drop(record);

        match result {
            Ok(()) => {
                log::info!("stopped service {}", name);
                Ok(())
            }
            Err(e) => Err(Failure::new(format!(
                "ServiceManager: exception in stop for service {}: {}",
                name, e
            ))),
        }
    }

    /// Stop every registered service, front to back. Individual failures are
    /// logged and do not prevent the remaining services from stopping.
    pub fn stop_all(&mut self) {
        while let Some(record) = self.services.first() {
            let name = record.name.clone();
            if let Err(failure) = self.stop(&name) {
                log::error!("{}", failure.reason);
            }
        }
        debug_assert!(self.services.is_empty());
    }

    /// Names and states of the registered services, in registration order.
    pub fn services(&self) -> impl Iterator<Item = (&str, ServiceState)> {
        self.services.iter().map(|r| (r.name.as_str(), r.state))
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.services.iter().position(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_entry_point_only() {
        let d = ServiceDescriptor::parse("Alpha", "libA:create");
        assert_eq!(d.name, "Alpha");
        assert_eq!(d.entry_point, "libA:create");
        assert!(d.args.is_empty());
    }

    #[test]
    fn test_descriptor_with_args() {
        let d = ServiceDescriptor::parse("Beta", "libB:create  --Beta.x=1 extra");
        assert_eq!(d.entry_point, "libB:create");
        assert_eq!(d.args, vec!["--Beta.x=1", "extra"]);
    }

    #[test]
    fn test_descriptor_tokenizes_on_tabs_and_newlines() {
        let d = ServiceDescriptor::parse("Gamma", "libG:create\t-a\n-b \t\n -c");
        assert_eq!(d.entry_point, "libG:create");
        assert_eq!(d.args, vec!["-a", "-b", "-c"]);
    }

    #[test]
    fn test_descriptor_empty_value() {
        let d = ServiceDescriptor::parse("Empty", "");
        assert_eq!(d.entry_point, "");
        assert!(d.args.is_empty());
    }
}
