//! Loaded forms bound to their notification handles.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::form::{Credentials, Form, NotificationTarget};
use crate::domain::notification::{BrokerDispatcher, Notification, WebhookDispatcher};

/// Reasons a form cannot be registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Another form already uses the name.
    #[error("form `{name}` is defined more than once")]
    DuplicateForm {
        /// Repeated form name.
        name: String,
    },
    /// The form publishes to a broker but none is configured.
    #[error("form `{form}` publishes to {target} but no broker is configured")]
    BrokerUnavailable {
        /// Offending form.
        form: String,
        /// Target description.
        target: String,
    },
}

/// Creates notification handles for configured targets.
#[derive(Clone)]
pub struct NotificationFactory {
    webhook: Arc<WebhookDispatcher>,
    broker: Option<Arc<BrokerDispatcher>>,
}

impl NotificationFactory {
    /// Factory backed by the given dispatchers; `broker` is `None` when no
    /// broker connection is configured.
    pub fn new(webhook: Arc<WebhookDispatcher>, broker: Option<Arc<BrokerDispatcher>>) -> Self {
        Self { webhook, broker }
    }

    /// Bind every target of `form`.
    pub fn bind(&self, form: Form) -> Result<RegisteredForm, RegistryError> {
        let notifications = form
            .targets()
            .iter()
            .map(|target| match (target, &self.broker) {
                (NotificationTarget::Webhook(hook), _) => Ok(self.webhook.create(hook.clone())),
                (NotificationTarget::Broker(publish), Some(broker)) => {
                    Ok(broker.create(publish.clone()))
                }
                (NotificationTarget::Broker(_), None) => Err(RegistryError::BrokerUnavailable {
                    form: form.name().to_owned(),
                    target: target.describe(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RegisteredForm::new(form, notifications))
    }
}

/// A form together with the handles of its notification targets.
#[derive(Clone)]
pub struct RegisteredForm {
    definition: Arc<Form>,
    notifications: Vec<Arc<dyn Notification>>,
}

impl RegisteredForm {
    /// Pair `form` with already-created notification handles.
    pub fn new(form: Form, notifications: Vec<Arc<dyn Notification>>) -> Self {
        Self {
            definition: Arc::new(form),
            notifications,
        }
    }

    /// Form definition.
    pub fn definition(&self) -> &Arc<Form> {
        &self.definition
    }

    /// Notification handles in target order.
    pub fn notifications(&self) -> &[Arc<dyn Notification>] {
        &self.notifications
    }
}

/// Name-indexed set of loaded forms.
#[derive(Clone, Default)]
pub struct FormRegistry {
    forms: BTreeMap<String, RegisteredForm>,
}

impl FormRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `form`, rejecting duplicate names.
    pub fn insert(&mut self, form: RegisteredForm) -> Result<(), RegistryError> {
        let name = form.definition.name().to_owned();
        if self.forms.contains_key(&name) {
            return Err(RegistryError::DuplicateForm { name });
        }
        self.forms.insert(name, form);
        Ok(())
    }

    /// Form registered under `name`.
    pub fn get(&self, name: &str) -> Option<&RegisteredForm> {
        self.forms.get(name)
    }

    /// Number of registered forms.
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    /// Whether no form is registered.
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// Forms the caller may see, ordered by name.
    pub fn visible<'a>(
        &'a self,
        credentials: Option<&'a Credentials>,
    ) -> impl Iterator<Item = &'a Form> + 'a {
        self.forms
            .values()
            .map(|form| form.definition.as_ref())
            .filter(move |form| form.is_allowed(credentials))
    }
}
