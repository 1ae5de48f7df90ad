use anyhow::{Context, Result};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

use crate::{
    database::{inmemory::InMemoryDatabase, pool::create_sqlite_pool, sqlite::SqliteDatabase},
    devices::{database::DeviceDatabase, entities::GatewayKind, service::DeviceService},
    notifications::{
        config::{ApnsConfig, GcmConfig, WnsConfig, error_translator},
        gateway::{
            PushTransport, apns::ApnsTransport, dummy::DummyTransport, gcm::GcmTransport,
            wns::WnsTransport,
        },
        service::NotificationService,
    },
    settings::{DatabaseSettings, Settings},
};

pub struct AppContext {
    pub device_service: DeviceService,
}

impl AppContext {
    /// Validates the gateway settings and wires up the registry, transports
    /// and delivery services.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let devices = Self::create_database(&settings.database).await?;

        let translator = error_translator(
            settings.apns.as_ref(),
            settings.gcm.as_ref(),
            settings.wns.as_ref(),
        );

        let mut senders = HashMap::new();
        for gateway in GatewayKind::ALL {
            let Some(transport) = Self::create_transport(gateway, settings)? else {
                warn!(%gateway, "Gateway is not configured and will be unavailable");
                continue;
            };

            let service =
                NotificationService::new(devices.clone(), transport, translator.clone());
            senders.insert(gateway, Arc::new(service));
        }

        Ok(Self {
            device_service: DeviceService::new(devices, senders),
        })
    }

    async fn create_database(settings: &DatabaseSettings) -> Result<Arc<dyn DeviceDatabase>> {
        match settings {
            DatabaseSettings::InMemory => {
                info!("Using in-memory device registry");
                Ok(Arc::new(InMemoryDatabase::new()))
            }
            DatabaseSettings::Sqlite { path } => {
                info!(%path, "Using sqlite device registry");
                let pool = create_sqlite_pool(path)
                    .await
                    .context("Failed to open sqlite database")?;
                let db = SqliteDatabase::new(pool);
                db.init().await.context("Failed to create tables")?;
                Ok(Arc::new(db))
            }
        }
    }

    fn create_transport(
        gateway: GatewayKind,
        settings: &Settings,
    ) -> Result<Option<Arc<dyn PushTransport>>> {
        let transport: Arc<dyn PushTransport> = match gateway {
            GatewayKind::Apns => match &settings.apns {
                Some(apns) => Arc::new(ApnsTransport::new(ApnsConfig::from_settings(
                    apns,
                    settings.development,
                )?)),
                None => return Ok(Self::dummy_transport(gateway, settings.development)),
            },
            GatewayKind::Gcm => match &settings.gcm {
                Some(gcm) => Arc::new(GcmTransport::new(GcmConfig::from_settings(gcm)?)),
                None => return Ok(Self::dummy_transport(gateway, settings.development)),
            },
            GatewayKind::Wns => match &settings.wns {
                Some(wns) => Arc::new(WnsTransport::new(WnsConfig::from_settings(wns)?)),
                None => return Ok(Self::dummy_transport(gateway, settings.development)),
            },
        };

        Ok(Some(transport))
    }

    fn dummy_transport(gateway: GatewayKind, development: bool) -> Option<Arc<dyn PushTransport>> {
        if !development {
            return None;
        }
        info!(%gateway, "Using dummy transport");
        Some(Arc::new(DummyTransport::new(gateway)))
    }
}
