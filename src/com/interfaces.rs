//! Built-in interface tables
//!
//! Method order is the native vtable order; inherited methods come first.
//! Shapes list the arguments after the receiver.

crate::com_interface! {
    /// IUnknown: identity and reference counting
    pub Unknown("IUnknown", 0x00000000_0000_0000_C000_000000000046) {
        QueryInterface(Ptr, OutPtr),
        AddRef(),
        Release(),
    }

    /// IDispatch: late-bound automation
    pub Dispatch("IDispatch", 0x00020400_0000_0000_C000_000000000046): Unknown {
        GetTypeInfoCount(OutPtr),
        GetTypeInfo(U32, U32, OutPtr),
        GetIDsOfNames(Ptr, Ptr, U32, U32, OutPtr),
        Invoke(I32, Ptr, U32, U16, Ptr, OutPtr, OutPtr, OutPtr),
    }

    /// IInspectable: base of runtime classes
    pub Inspectable("IInspectable", 0xAF86E2E0_B12D_4c6a_9C5A_D7AA65101E90): Unknown {
        GetIids(OutPtr, OutPtr),
        GetRuntimeClassName(OutPtr),
        GetTrustLevel(OutPtr),
    }

    /// ID3DBlob: byte buffer returned by the shader compiler
    pub Blob("ID3DBlob", 0x8BA5FB08_5195_40e2_AC58_0D989C3A0102): Unknown {
        GetBufferPointer(),
        GetBufferSize(),
    }
}

crate::com_interface! {
    pub DxgiObject("IDXGIObject", 0xaec22fb8_76f3_4639_9be0_28eb43a67a2e): Unknown {
        SetPrivateData(Ptr, U32, Ptr),
        SetPrivateDataInterface(Ptr, Handle),
        GetPrivateData(Ptr, Ptr, Ptr),
        GetParent(Ptr, OutPtr),
    }

    pub DxgiDeviceSubObject("IDXGIDeviceSubObject", 0x3d3e0379_f9de_4d58_bb6c_18d62992f1a6): DxgiObject {
        GetDevice(Ptr, OutPtr),
    }

    /// IDXGISwapChain
    pub DxgiSwapChain("IDXGISwapChain", 0x310d36a0_d2e7_4c0a_aa04_6a9d23b8886a): DxgiDeviceSubObject {
        Present(U32, U32),
        GetBuffer(U32, Ptr, OutPtr),
        SetFullscreenState(I32, Handle),
        GetFullscreenState(OutPtr, OutPtr),
        GetDesc(OutPtr),
        ResizeBuffers(U32, U32, U32, U32, U32),
        ResizeTarget(Ptr),
        GetContainingOutput(OutPtr),
        GetFrameStatistics(OutPtr),
        GetLastPresentCount(OutPtr),
    }
}

crate::com_interface! {
    /// ID3D11Device
    pub D3D11Device("ID3D11Device", 0xdb6f6ddb_ac77_4e88_8253_819df9bbf140): Unknown {
        CreateBuffer(Ptr, Ptr, OutPtr),
        CreateTexture1D(Ptr, Ptr, OutPtr),
        CreateTexture2D(Ptr, Ptr, OutPtr),
        CreateTexture3D(Ptr, Ptr, OutPtr),
        CreateShaderResourceView(Handle, Ptr, OutPtr),
        CreateUnorderedAccessView(Handle, Ptr, OutPtr),
        CreateRenderTargetView(Handle, Ptr, OutPtr),
        CreateDepthStencilView(Handle, Ptr, OutPtr),
        CreateInputLayout(Ptr, U32, Ptr, Usize, OutPtr),
        CreateVertexShader(Ptr, Usize, Handle, OutPtr),
        CreateGeometryShader(Ptr, Usize, Handle, OutPtr),
        CreateGeometryShaderWithStreamOutput(Ptr, Usize, Ptr, U32, Ptr, U32, U32, Handle, OutPtr),
        CreatePixelShader(Ptr, Usize, Handle, OutPtr),
        CreateHullShader(Ptr, Usize, Handle, OutPtr),
        CreateDomainShader(Ptr, Usize, Handle, OutPtr),
        CreateComputeShader(Ptr, Usize, Handle, OutPtr),
        CreateClassLinkage(OutPtr),
        CreateBlendState(Ptr, OutPtr),
        CreateDepthStencilState(Ptr, OutPtr),
        CreateRasterizerState(Ptr, OutPtr),
        CreateSamplerState(Ptr, OutPtr),
        CreateQuery(Ptr, OutPtr),
        CreatePredicate(Ptr, OutPtr),
        CreateCounter(Ptr, OutPtr),
        CreateDeferredContext(U32, OutPtr),
        OpenSharedResource(Ptr, Ptr, OutPtr),
        CheckFormatSupport(U32, OutPtr),
        CheckMultisampleQualityLevels(U32, U32, OutPtr),
        CheckCounterInfo(OutPtr),
        CheckCounter(Ptr, OutPtr, OutPtr, OutPtr, OutPtr, OutPtr, OutPtr, OutPtr, OutPtr),
        CheckFeatureSupport(U32, Ptr, U32),
        GetPrivateData(Ptr, Ptr, Ptr),
        SetPrivateData(Ptr, U32, Ptr),
        SetPrivateDataInterface(Ptr, Handle),
        GetFeatureLevel(),
        GetCreationFlags(),
        GetDeviceRemovedReason(),
        GetImmediateContext(OutPtr),
        SetExceptionMode(U32),
        GetExceptionMode(),
    }

    /// ID3D11DeviceChild: common base of device-owned objects
    pub D3D11DeviceChild("ID3D11DeviceChild", 0x1841e5c8_16b0_489b_bcc8_44cfb0d5deae): Unknown {
        GetDevice(OutPtr),
        GetPrivateData(Ptr, Ptr, Ptr),
        SetPrivateData(Ptr, U32, Ptr),
        SetPrivateDataInterface(Ptr, Handle),
    }

    /// ID3D11DeviceContext (immediate or deferred)
    pub D3D11DeviceContext("ID3D11DeviceContext", 0xc0bfa96c_e089_44fb_8eaf_26f8796190da): D3D11DeviceChild {
        VSSetConstantBuffers(U32, U32, Ptr),
        PSSetShaderResources(U32, U32, Ptr),
        PSSetShader(Handle, Ptr, U32),
        PSSetSamplers(U32, U32, Ptr),
        VSSetShader(Handle, Ptr, U32),
        DrawIndexed(U32, U32, I32),
        Draw(U32, U32),
        Map(Handle, U32, U32, U32, OutPtr),
        Unmap(Handle, U32),
        PSSetConstantBuffers(U32, U32, Ptr),
        IASetInputLayout(Handle),
        IASetVertexBuffers(U32, U32, Ptr, Ptr, Ptr),
        IASetIndexBuffer(Handle, U32, U32),
        DrawIndexedInstanced(U32, U32, U32, I32, U32),
        DrawInstanced(U32, U32, U32, U32),
        GSSetConstantBuffers(U32, U32, Ptr),
        GSSetShader(Handle, Ptr, U32),
        IASetPrimitiveTopology(U32),
        VSSetShaderResources(U32, U32, Ptr),
        VSSetSamplers(U32, U32, Ptr),
        Begin(Handle),
        End(Handle),
        GetData(Handle, Ptr, U32, U32),
        SetPredication(Handle, I32),
        GSSetShaderResources(U32, U32, Ptr),
        GSSetSamplers(U32, U32, Ptr),
        OMSetRenderTargets(U32, Ptr, Handle),
        OMSetRenderTargetsAndUnorderedAccessViews(U32, Ptr, Handle, U32, U32, Ptr, Ptr),
        OMSetBlendState(Handle, Ptr, U32),
        OMSetDepthStencilState(Handle, U32),
        SOSetTargets(U32, Ptr, Ptr),
        DrawAuto(),
        DrawIndexedInstancedIndirect(Handle, U32),
        DrawInstancedIndirect(Handle, U32),
        Dispatch(U32, U32, U32),
        DispatchIndirect(Handle, U32),
        RSSetState(Handle),
        RSSetViewports(U32, Ptr),
        RSSetScissorRects(U32, Ptr),
        CopySubresourceRegion(Handle, U32, U32, U32, U32, Handle, U32, Ptr),
        CopyResource(Handle, Handle),
        UpdateSubresource(Handle, U32, Ptr, Ptr, U32, U32),
        CopyStructureCount(Handle, U32, Handle),
        ClearRenderTargetView(Handle, Ptr),
        ClearUnorderedAccessViewUint(Handle, Ptr),
        ClearUnorderedAccessViewFloat(Handle, Ptr),
        ClearDepthStencilView(Handle, U32, F32, U8),
        GenerateMips(Handle),
        SetResourceMinLOD(Handle, F32),
        // returns FLOAT in a vector register; the word result is meaningless
        GetResourceMinLOD(Handle),
        ResolveSubresource(Handle, U32, Handle, U32, U32),
        ExecuteCommandList(Handle, I32),
        HSSetShaderResources(U32, U32, Ptr),
        HSSetShader(Handle, Ptr, U32),
        HSSetSamplers(U32, U32, Ptr),
        HSSetConstantBuffers(U32, U32, Ptr),
        DSSetShaderResources(U32, U32, Ptr),
        DSSetShader(Handle, Ptr, U32),
        DSSetSamplers(U32, U32, Ptr),
        DSSetConstantBuffers(U32, U32, Ptr),
        CSSetShaderResources(U32, U32, Ptr),
        CSSetUnorderedAccessViews(U32, U32, Ptr, Ptr),
        CSSetShader(Handle, Ptr, U32),
        CSSetSamplers(U32, U32, Ptr),
        CSSetConstantBuffers(U32, U32, Ptr),
        VSGetConstantBuffers(U32, U32, OutPtr),
        PSGetShaderResources(U32, U32, OutPtr),
        PSGetShader(OutPtr, OutPtr, OutPtr),
        PSGetSamplers(U32, U32, OutPtr),
        VSGetShader(OutPtr, OutPtr, OutPtr),
        PSGetConstantBuffers(U32, U32, OutPtr),
        IAGetInputLayout(OutPtr),
        IAGetVertexBuffers(U32, U32, OutPtr, OutPtr, OutPtr),
        IAGetIndexBuffer(OutPtr, OutPtr, OutPtr),
        GSGetConstantBuffers(U32, U32, OutPtr),
        GSGetShader(OutPtr, OutPtr, OutPtr),
        IAGetPrimitiveTopology(OutPtr),
        VSGetShaderResources(U32, U32, OutPtr),
        VSGetSamplers(U32, U32, OutPtr),
        GetPredication(OutPtr, OutPtr),
        GSGetShaderResources(U32, U32, OutPtr),
        GSGetSamplers(U32, U32, OutPtr),
        OMGetRenderTargets(U32, OutPtr, OutPtr),
        OMGetRenderTargetsAndUnorderedAccessViews(U32, OutPtr, OutPtr, U32, U32, OutPtr),
        OMGetBlendState(OutPtr, OutPtr, OutPtr),
        OMGetDepthStencilState(OutPtr, OutPtr),
        SOGetTargets(U32, OutPtr),
        RSGetState(OutPtr),
        RSGetViewports(OutPtr, OutPtr),
        RSGetScissorRects(OutPtr, OutPtr),
        HSGetShaderResources(U32, U32, OutPtr),
        HSGetShader(OutPtr, OutPtr, OutPtr),
        HSGetSamplers(U32, U32, OutPtr),
        HSGetConstantBuffers(U32, U32, OutPtr),
        DSGetShaderResources(U32, U32, OutPtr),
        DSGetShader(OutPtr, OutPtr, OutPtr),
        DSGetSamplers(U32, U32, OutPtr),
        DSGetConstantBuffers(U32, U32, OutPtr),
        CSGetShaderResources(U32, U32, OutPtr),
        CSGetUnorderedAccessViews(U32, U32, OutPtr),
        CSGetShader(OutPtr, OutPtr, OutPtr),
        CSGetSamplers(U32, U32, OutPtr),
        CSGetConstantBuffers(U32, U32, OutPtr),
        ClearState(),
        Flush(),
        GetType(),
        GetContextFlags(),
        FinishCommandList(I32, OutPtr),
    }
}

crate::com_interface! {
    pub D3D11Resource("ID3D11Resource", 0xdc8e63f3_d12b_4952_b47b_5e45026a862d): D3D11DeviceChild {
        GetType(OutPtr),
        SetEvictionPriority(U32),
        GetEvictionPriority(),
    }

    pub D3D11Texture2D("ID3D11Texture2D", 0x6f15aaf2_d208_4e89_9ab4_489535d34f9c): D3D11Resource {
        GetDesc(OutPtr),
    }

    pub D3D11Buffer("ID3D11Buffer", 0x48570b85_d1ee_4fcd_a250_eb350722b037): D3D11Resource {
        GetDesc(OutPtr),
    }

    pub D3D11View("ID3D11View", 0x839d1216_bb2e_412b_b7f4_a9dbebe08ed1): D3D11DeviceChild {
        GetResource(OutPtr),
    }

    pub D3D11RenderTargetView("ID3D11RenderTargetView", 0xdfdba067_0b8d_4865_875b_d7b4516cc164): D3D11View {
        GetDesc(OutPtr),
    }

    pub D3D11VertexShader("ID3D11VertexShader", 0x3b301d64_d678_4289_8897_22f8928b72f3): D3D11DeviceChild {}

    pub D3D11PixelShader("ID3D11PixelShader", 0xea82e40d_51dc_4f33_93d4_db7c9125ae8c): D3D11DeviceChild {}

    pub D3D11InputLayout("ID3D11InputLayout", 0xe4819ddc_4cf0_4025_bd26_5de82a3e07b7): D3D11DeviceChild {}
}
