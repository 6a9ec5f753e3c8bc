use std::collections::HashMap;

use zbus::blocking::fdo::{DBusProxy, PropertiesProxy};
use zbus::blocking::Connection;
use zbus::names::InterfaceName;
use zbus::zvariant::{OwnedValue, Value};
use zbus::{fdo, CacheProperties};

use crate::bus::{BusError, BusValue, MediaBus, MPRIS_OBJECT_PATH};

/// `MediaBus` over the user's D-Bus session bus.
pub struct SessionBus {
    connection: Connection,
}

impl SessionBus {
    pub fn connect() -> Result<Self, BusError> {
        let connection = Connection::session().map_err(classify_zbus)?;
        Ok(Self { connection })
    }

    fn properties<'p>(&self, service: &'p str) -> zbus::Result<PropertiesProxy<'p>> {
        PropertiesProxy::builder(&self.connection)
            .destination(service)?
            .path(MPRIS_OBJECT_PATH)?
            .cache_properties(CacheProperties::No)
            .build()
    }
}

impl MediaBus for SessionBus {
    fn list_service_names(&self) -> Result<Vec<String>, BusError> {
        let proxy = DBusProxy::new(&self.connection).map_err(classify_zbus)?;
        let names = proxy.list_names().map_err(classify_fdo)?;
        Ok(names
            .into_iter()
            .map(|name| name.as_str().to_owned())
            .collect())
    }

    fn get_property(
        &self,
        service: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError> {
        let interface = InterfaceName::try_from(interface)
            .map_err(|err| BusError::Transport(format!("invalid interface {interface}: {err}")))?;
        let proxy = self.properties(service).map_err(classify_zbus)?;
        let value = proxy.get(interface, property).map_err(classify_fdo)?;
        Ok(convert_owned(value))
    }

    fn invoke_method(
        &self,
        service: &str,
        interface: &str,
        method: &str,
    ) -> Result<(), BusError> {
        self.connection
            .call_method(Some(service), MPRIS_OBJECT_PATH, Some(interface), method, &())
            .map(drop)
            .map_err(classify_zbus)
    }
}

fn classify_zbus(err: zbus::Error) -> BusError {
    match err {
        zbus::Error::MethodError(name, detail, _) => {
            let name = name.as_str().to_owned();
            let detail = detail.unwrap_or_default();
            BusError::from_error_name(&name, detail)
        }
        zbus::Error::FDO(err) => classify_fdo(*err),
        other => BusError::Transport(other.to_string()),
    }
}

fn classify_fdo(err: fdo::Error) -> BusError {
    match err {
        fdo::Error::ServiceUnknown(detail) | fdo::Error::NameHasNoOwner(detail) => {
            BusError::NoActivePlayer(detail)
        }
        fdo::Error::ZBus(err) => classify_zbus(err),
        other => BusError::Transport(other.to_string()),
    }
}

// Metadata arrives as a{sv}; everything else is a plain scalar or array.
fn convert_owned(value: OwnedValue) -> BusValue {
    if matches!(&*value, Value::Dict(_)) {
        return match HashMap::<String, OwnedValue>::try_from(value) {
            Ok(map) => BusValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, convert(&value)))
                    .collect(),
            ),
            Err(err) => {
                log::debug!("Unsupported dictionary value on the bus: {err}");
                BusValue::Unsupported
            }
        };
    }
    convert(&value)
}

fn convert(value: &Value<'_>) -> BusValue {
    match value {
        Value::Bool(flag) => BusValue::Bool(*flag),
        Value::U8(n) => BusValue::Int(i64::from(*n)),
        Value::I16(n) => BusValue::Int(i64::from(*n)),
        Value::U16(n) => BusValue::Int(i64::from(*n)),
        Value::I32(n) => BusValue::Int(i64::from(*n)),
        Value::U32(n) => BusValue::Int(i64::from(*n)),
        Value::I64(n) => BusValue::Int(*n),
        Value::U64(n) => BusValue::Int(i64::try_from(*n).unwrap_or(i64::MAX)),
        Value::F64(n) => BusValue::Float(*n),
        Value::Str(text) => BusValue::Str(text.as_str().to_owned()),
        Value::ObjectPath(path) => BusValue::Str(path.as_str().to_owned()),
        Value::Array(items) => BusValue::List(items.iter().map(convert).collect()),
        Value::Value(inner) => convert(inner),
        _ => BusValue::Unsupported,
    }
}
