//! Notification unit published after every externally visible mutation.
//!
//! A [`Message`] carries the calling context (service, method, owner), the
//! outcome of the call and an [`Envelope`] with the affected entity. The
//! authorization gate stamps the per-user permission map before the message
//! is dispatched; listeners use it to decide whether their connection may see
//! the message.
//!
//! ## Wire Format
//!
//! ```text
//! {"messageId":"...","serviceCalled":"PipelineDefinitionService","methodCalled":"add",
//!  "packageName":"ferrocd_services::pipeline_definitions",
//!  "envelope":{"typeTag":"PIPELINE_DEFINITION","payload":{"kind":"PIPELINE_DEFINITION","data":{...}}},
//!  "resultNotificationType":"SUCCESS","resultMessage":"...","ownerId":"...",
//!  "isTargetOwner":false,"isUserUpdate":false,
//!  "scope":{"scope":"PIPELINE","pipelineGroupId":"...","pipelineDefinitionId":"..."},
//!  "requiredPermissionType":"VIEWER","permissionTypeByUser":{"<user id>":"VIEWER"}}
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::{Envelope, Payload};
use crate::error::Result;
use crate::models::User;
use crate::permission::{PermissionType, ResourceScope};

/// Outcome classification of a service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Success,
    Error,
    Warning,
    Info,
}

/// Result record returned upward by every service operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResult<T> {
    pub entity: Option<T>,
    pub notification_type: NotificationType,
    pub message: String,
}

impl<T> ServiceResult<T> {
    pub fn success(entity: T, message: impl Into<String>) -> Self {
        Self {
            entity: Some(entity),
            notification_type: NotificationType::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            entity: None,
            notification_type: NotificationType::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.notification_type == NotificationType::Error
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ServiceResult<U> {
        ServiceResult {
            entity: self.entity.map(f),
            notification_type: self.notification_type,
            message: self.message,
        }
    }
}

/// How a listener routes a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryClass {
    /// Every connection whose grant at the message scope meets the requirement.
    Broadcast,
    /// Only the owner's own connections, regardless of grants.
    OwnerTargeted,
    /// Routed like a broadcast; receivers refresh their own identity.
    UserUpdate,
}

/// Notification unit handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: Uuid,
    #[serde(default)]
    pub service_called: String,
    #[serde(default)]
    pub method_called: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    pub envelope: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_notification_type: Option<NotificationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub is_target_owner: bool,
    #[serde(default)]
    pub is_user_update: bool,
    /// Resource the result belongs to.
    pub scope: ResourceScope,
    /// Minimum type a connection needs when it has no entry in the map.
    pub required_permission_type: PermissionType,
    #[serde(default)]
    permission_type_by_user: HashMap<String, PermissionType>,
}

impl Message {
    /// Minimal notification around an envelope.
    ///
    /// Without a gate stamp the message is globally visible.
    pub fn from_envelope(envelope: Envelope) -> Self {
        Self {
            message_id: Uuid::now_v7(),
            service_called: String::new(),
            method_called: String::new(),
            package_name: None,
            envelope,
            result_notification_type: None,
            result_message: None,
            owner_id: None,
            is_target_owner: false,
            is_user_update: false,
            scope: ResourceScope::Server,
            required_permission_type: PermissionType::None,
            permission_type_by_user: HashMap::new(),
        }
    }

    /// Notification describing a finished service call.
    pub fn from_result<T>(
        service_called: &str,
        method_called: &str,
        result: &ServiceResult<T>,
        owner: &User,
    ) -> Self
    where
        T: Clone + Into<Payload>,
    {
        Self {
            service_called: service_called.to_string(),
            method_called: method_called.to_string(),
            result_notification_type: Some(result.notification_type),
            result_message: Some(result.message.clone()),
            owner_id: Some(owner.id.clone()),
            ..Self::from_envelope(Envelope::new(result.entity.clone()))
        }
    }

    /// Fully explicit notification.
    pub fn new(
        service_called: &str,
        package_name: &str,
        method_called: &str,
        payload: impl Into<Payload>,
        notification_type: NotificationType,
        result_message: impl Into<String>,
        owner: &User,
    ) -> Self {
        Self {
            service_called: service_called.to_string(),
            method_called: method_called.to_string(),
            package_name: Some(package_name.to_string()),
            result_notification_type: Some(notification_type),
            result_message: Some(result_message.into()),
            owner_id: Some(owner.id.clone()),
            ..Self::from_envelope(Envelope::new(payload))
        }
    }

    /// Restricts delivery to the owner's own connections.
    pub fn with_target_owner(mut self, is_target_owner: bool) -> Self {
        self.is_target_owner = is_target_owner;
        self
    }

    pub fn with_user_update(mut self, is_user_update: bool) -> Self {
        self.is_user_update = is_user_update;
        self
    }

    /// Sets the resource the result belongs to and its base requirement.
    pub fn with_scope(mut self, scope: ResourceScope, required: PermissionType) -> Self {
        self.scope = scope;
        self.required_permission_type = required;
        self
    }

    pub fn with_package_name(mut self, package_name: &str) -> Self {
        self.package_name = Some(package_name.to_string());
        self
    }

    /// Replaces the per-user permission map. Called by the authorization gate
    /// before dispatch; a dispatched message is owned by the transport and
    /// can no longer be stamped.
    pub fn stamp_permissions(&mut self, permission_type_by_user: HashMap<String, PermissionType>) {
        self.permission_type_by_user = permission_type_by_user;
    }

    /// The stamped requirement for `user_id`, if any.
    pub fn permission_type_for(&self, user_id: &str) -> Option<PermissionType> {
        self.permission_type_by_user.get(user_id).copied()
    }

    pub fn permission_type_by_user(&self) -> &HashMap<String, PermissionType> {
        &self.permission_type_by_user
    }

    pub fn delivery_class(&self) -> DeliveryClass {
        if self.is_target_owner {
            DeliveryClass::OwnerTargeted
        } else if self.is_user_update {
            DeliveryClass::UserUpdate
        } else {
            DeliveryClass::Broadcast
        }
    }

    /// `Service.method` identifier used in logs.
    pub fn operation(&self) -> String {
        format!("{}.{}", self.service_called, self.method_called)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Message{{serviceCalled='{}', methodCalled='{}', resultNotificationType={:?}, resultMessage='{}', owner={:?}}}",
            self.service_called,
            self.method_called,
            self.result_notification_type,
            self.result_message.as_deref().unwrap_or_default(),
            self.owner_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EntityKind;
    use crate::models::PipelineDefinition;
    use serde_json::json;

    #[test]
    fn test_from_envelope_is_minimal() {
        let message = Message::from_envelope(Envelope::new(User::new("a@example.com")));
        assert!(message.service_called.is_empty());
        assert!(message.owner_id.is_none());
        assert!(message.permission_type_by_user().is_empty());
        assert_eq!(message.delivery_class(), DeliveryClass::Broadcast);
        assert_eq!(message.required_permission_type, PermissionType::None);
    }

    #[test]
    fn test_from_result_derives_outcome() {
        let owner = User::new("owner@example.com");
        let definition = PipelineDefinition::new("deploy");
        let result = ServiceResult::success(definition.clone(), "PipelineDefinition created successfully.");

        let message = Message::from_result("PipelineDefinitionService", "add", &result, &owner);

        assert_eq!(message.operation(), "PipelineDefinitionService.add");
        assert_eq!(message.result_notification_type, Some(NotificationType::Success));
        assert_eq!(message.owner_id.as_deref(), Some(owner.id.as_str()));
        assert_eq!(message.envelope.type_tag(), EntityKind::PipelineDefinition);
    }

    #[test]
    fn test_error_result_carries_empty_envelope() {
        let owner = User::new("owner@example.com");
        let result: ServiceResult<PipelineDefinition> = ServiceResult::error("could not be created");
        let message = Message::from_result("PipelineDefinitionService", "add", &result, &owner);
        assert_eq!(message.envelope.type_tag(), EntityKind::Empty);
        assert_eq!(message.result_notification_type, Some(NotificationType::Error));
    }

    #[test]
    fn test_target_owner_overrides_class() {
        let owner = User::new("owner@example.com");
        let message = Message::new(
            "UserService",
            "ferrocd_services::users",
            "changePassword",
            owner.clone(),
            NotificationType::Success,
            "Password changed.",
            &owner,
        )
        .with_user_update(true)
        .with_target_owner(true);

        assert_eq!(message.delivery_class(), DeliveryClass::OwnerTargeted);
        assert_eq!(message.package_name.as_deref(), Some("ferrocd_services::users"));
    }

    #[test]
    fn test_wire_form_field_names() {
        let owner = User::new("owner@example.com");
        let mut message = Message::from_result(
            "UserGroupService",
            "delete",
            &ServiceResult::success(owner.clone(), "deleted"),
            &owner,
        )
        .with_scope(ResourceScope::Server, PermissionType::Admin);
        message.stamp_permissions(HashMap::from([(owner.id.clone(), PermissionType::Admin)]));

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["serviceCalled"], "UserGroupService");
        assert_eq!(value["methodCalled"], "delete");
        assert_eq!(value["resultNotificationType"], "SUCCESS");
        assert_eq!(value["ownerId"], json!(owner.id));
        assert_eq!(value["isTargetOwner"], false);
        assert_eq!(value["isUserUpdate"], false);
        assert_eq!(value["requiredPermissionType"], "ADMIN");
        assert_eq!(value["permissionTypeByUser"][owner.id.as_str()], "ADMIN");
        assert_eq!(value["envelope"]["typeTag"], "USER");
        assert!(value.get("packageName").is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Message::decode("{not json").is_err());
    }

    #[test]
    fn test_encode_decode_preserves_stamp() {
        let owner = User::new("owner@example.com");
        let mut message = Message::from_envelope(Envelope::new(owner.clone()));
        message.stamp_permissions(HashMap::from([(owner.id.clone(), PermissionType::Viewer)]));

        let decoded = Message::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded.permission_type_for(&owner.id), Some(PermissionType::Viewer));
        assert_eq!(decoded.permission_type_for("someone-else"), None);
        assert_eq!(decoded, message);
    }
}
