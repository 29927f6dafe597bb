#[cfg(all(windows, feature = "sgfx-dx11"))]
use crate::backends::dx11::{SgfxApiDefDx11, SgfxDeviceDx11};
#[cfg(all(windows, feature = "sgfx-dx12"))]
use crate::backends::dx12::{SgfxApiDefDx12, SgfxDeviceDx12};
#[cfg(feature = "sgfx-gl4")]
use crate::backends::gl4::{SgfxApiDefGl4, SgfxDeviceGl4};
use crate::backends::null::SgfxDeviceNull;
use crate::device::SgfxDeviceBackend;
use crate::*;

/// Primary entry point to using the API. Use the `new_*` functions to initialize the desired
/// backend, then `device_mut()` to create resources and submit work.
///
/// **Every object created through the device must be destroyed before the API object is.** This is
/// verified when the API object is destroyed, either explicitly via `destroy()` or by dropping it.
/// Leaked objects are logged per kind and released.
pub struct SgfxApi {
    device: SgfxDevice,
    destroyed: bool,
}

impl SgfxApi {
    fn from_backend(backend: SgfxDeviceBackend) -> Self {
        let device = SgfxDevice::new(backend);
        let info = device.device_info();
        log::debug!(
            "Created {} device on {}",
            info.backend_type.name(),
            info.adapter_name
        );

        SgfxApi {
            device,
            destroyed: false,
        }
    }

    /// Headless device that records native calls instead of making them
    pub fn new_null(api_def: &SgfxApiDef) -> SgfxResult<Self> {
        api_def.verify()?;
        Ok(Self::from_backend(SgfxDeviceBackend::Null(
            SgfxDeviceNull::new(api_def)?,
        )))
    }

    /// Initialize a device on the GL context that is current on the calling thread
    ///
    /// # Safety
    ///
    /// The context that `gl_api_def.load_fn` resolves functions for must stay current on this
    /// thread for the lifetime of the API object.
    #[cfg(feature = "sgfx-gl4")]
    pub unsafe fn new_gl4(
        api_def: &SgfxApiDef,
        gl_api_def: SgfxApiDefGl4,
    ) -> SgfxResult<Self> {
        api_def.verify()?;
        Ok(Self::from_backend(SgfxDeviceBackend::Gl4(
            SgfxDeviceGl4::new(api_def, gl_api_def)?,
        )))
    }

    /// Initialize a device using Direct3D 11
    #[cfg(all(windows, feature = "sgfx-dx11"))]
    pub fn new_dx11(
        api_def: &SgfxApiDef,
        dx11_api_def: &SgfxApiDefDx11,
    ) -> SgfxResult<Self> {
        api_def.verify()?;
        Ok(Self::from_backend(SgfxDeviceBackend::Dx11(
            SgfxDeviceDx11::new(api_def, dx11_api_def)?,
        )))
    }

    /// Initialize a device using Direct3D 12
    #[cfg(all(windows, feature = "sgfx-dx12"))]
    pub fn new_dx12(
        api_def: &SgfxApiDef,
        dx12_api_def: &SgfxApiDefDx12,
    ) -> SgfxResult<Self> {
        api_def.verify()?;
        Ok(Self::from_backend(SgfxDeviceBackend::Dx12(
            SgfxDeviceDx12::new(api_def, dx12_api_def)?,
        )))
    }

    pub fn device(&self) -> &SgfxDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut SgfxDevice {
        &mut self.device
    }

    /// Releases the device. Fails, after logging and releasing them, if any objects were leaked.
    ///
    /// `destroy()` is automatically called if the API object is dropped and it has not yet been
    /// called, so it is not necessary to call this function explicitly.
    pub fn destroy(&mut self) -> SgfxResult<()> {
        if self.destroyed {
            return Ok(());
        }

        self.destroyed = true;
        let leaked = self.device.release();
        if leaked.total() == 0 {
            log::debug!("Destroyed {} device", self.device.backend_type().name());
            return Ok(());
        }

        for &kind in &SgfxHandleKind::ALL {
            let count = leaked.count(kind);
            if count > 0 {
                log::error!("{} {} object(s) were not destroyed", count, kind);
            }
        }

        Err(format!(
            "{} object(s) were still alive when the device was destroyed",
            leaked.total()
        )
        .into())
    }
}

impl Drop for SgfxApi {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            log::error!("Error while destroying the device: {}", e);
        }
    }
}
