//! Registered request/response type associations.

use crate::reflect::TypeKey;

/// Types attached to one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub request: Option<TypeKey>,
    pub response: Option<TypeKey>,
    /// Array types exposed as components of their own.
    pub nested_arrays: Vec<TypeKey>,
    /// Object types exposed as components of their own.
    pub nested_objects: Vec<TypeKey>,
}

impl Registration {
    pub fn new(request: Option<TypeKey>, response: Option<TypeKey>) -> Self {
        Self {
            request,
            response,
            ..Self::default()
        }
    }

    pub fn nested_array(mut self, key: TypeKey) -> Self {
        self.nested_arrays.push(key);
        self
    }

    pub fn nested_object(mut self, key: TypeKey) -> Self {
        self.nested_objects.push(key);
        self
    }
}

/// Every registered endpoint association, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    registrations: Vec<Registration>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: Registration) {
        self.registrations.push(registration);
    }

    /// Register a request/response pair.
    pub fn register_pair(&mut self, request: TypeKey, response: TypeKey) {
        self.register(Registration::new(Some(request), Some(response)));
    }

    pub fn register_request(&mut self, request: TypeKey) {
        self.register(Registration::new(Some(request), None));
    }

    pub fn register_response(&mut self, response: TypeKey) {
        self.register(Registration::new(None, Some(response)));
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
