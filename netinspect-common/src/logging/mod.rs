// Logging utilities for the netinspect pairing stack
//
// This module provides:
// - Component-based structured logging
// - Session id tracking through logger inheritance
// - Allocation-free variants taking fmt::Arguments for the log_* macros

use log::{debug, error, info, warn};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Provider,
    Authority,
    Csr,
    Targeting,
    Deploy,
    Toolchain,
    Transport,
    CLI,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Provider => "Provider",
            Component::Authority => "Authority",
            Component::Csr => "CSR",
            Component::Targeting => "Targeting",
            Component::Deploy => "Deploy",
            Component::Toolchain => "Toolchain",
            Component::Transport => "Transport",
            Component::CLI => "CLI",
            Component::Custom(name) => name,
        }
    }
}

// Display helper so the *_args variants never build a prefix String
struct ComponentPrefixDisplay {
    parent: Option<Component>,
    component: Component,
}

impl Display for ComponentPrefixDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != Component::Provider => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => write!(f, "{}", self.component.as_str()),
        }
    }
}

/// A helper for creating component-specific loggers with session tracking
#[derive(Debug, Clone)]
pub struct Logger {
    /// Component this logger is for
    component: Component,
    /// Provisioning session (or "host" outside of a session)
    session_id: String,
    /// Parent component for hierarchical logging (if any)
    parent_component: Option<Component>,
}

impl Logger {
    /// Create a new root logger for a component
    pub fn new_root(component: Component, session_id: &str) -> Self {
        Self {
            component,
            session_id: session_id.to_string(),
            parent_component: None,
        }
    }

    /// Create a child logger with the same session but a different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            session_id: self.session_id.clone(),
            parent_component: Some(self.component),
        }
    }

    /// Create a logger scoped to a provisioning session
    pub fn with_session(&self, session_id: impl Into<String>) -> Self {
        Self {
            component: self.component,
            session_id: session_id.into(),
            parent_component: self.parent_component,
        }
    }

    /// Get a reference to the session id
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the component this logger writes for
    pub fn component(&self) -> Component {
        self.component
    }

    fn prefix(&self) -> ComponentPrefixDisplay {
        ComponentPrefixDisplay {
            parent: self.parent_component,
            component: self.component,
        }
    }

    /// Log a debug message using fmt::Arguments
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.session_id, self.prefix(), args);
        }
    }

    /// Log an info message using fmt::Arguments
    pub fn info_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.session_id, self.prefix(), args);
        }
    }

    /// Log a warning using fmt::Arguments
    pub fn warn_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.session_id, self.prefix(), args);
        }
    }

    /// Log an error using fmt::Arguments
    pub fn error_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.session_id, self.prefix(), args);
        }
    }
}
